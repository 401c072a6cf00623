//! Image payload preparation for image-analysis requests

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::imageops::FilterType;
use log::{info, warn};
use std::path::Path;

/// Longest edge, in pixels, of an uploaded image
pub const MAX_UPLOAD_EDGE: u32 = 800;

/// JPEG quality used for uploads
pub const UPLOAD_JPEG_QUALITY: u8 = 70;

/// Reads an image and returns it as a `data:` URL suitable for `image_url` parts.
///
/// The image is downscaled so its longer edge is at most `MAX_UPLOAD_EDGE` and
/// re-encoded as JPEG. Files the decoder cannot read are sent as-is with a
/// mime type guessed from the extension.
pub async fn encode_for_upload(path: &Path) -> Result<String, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Failed to read image {}: {}", path.display(), e))?;

    match downscale_to_jpeg(&bytes) {
        Ok(jpeg) => {
            info!(
                "[encode_for_upload] {} -> {} bytes",
                path.display(),
                jpeg.len()
            );
            Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg)))
        }
        Err(e) => {
            warn!(
                "[encode_for_upload] Could not re-encode {}, sending original bytes: {}",
                path.display(),
                e
            );
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            Ok(format!("data:{};base64,{}", mime, BASE64.encode(bytes)))
        }
    }
}

/// Target size for an image, preserving aspect ratio
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }
    if width >= height {
        let h = (height as u64 * max_edge as u64 / width as u64).max(1) as u32;
        (max_edge, h)
    } else {
        let w = (width as u64 * max_edge as u64 / height as u64).max(1) as u32;
        (w, max_edge)
    }
}

fn downscale_to_jpeg(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory(bytes).map_err(|e| format!("Failed to decode: {}", e))?;

    let (w, h) = fit_within(img.width(), img.height(), MAX_UPLOAD_EDGE);
    let img = if (w, h) != (img.width(), img.height()) {
        img.resize_exact(w, h, FilterType::Triangle)
    } else {
        img
    };

    let mut buffer = std::io::Cursor::new(Vec::new());
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, UPLOAD_JPEG_QUALITY);
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| format!("Failed to encode image: {}", e))?;

    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(640, 480, 800), (640, 480));
        assert_eq!(fit_within(1600, 1200, 800), (800, 600));
        assert_eq!(fit_within(1000, 2000, 800), (400, 800));
        assert_eq!(fit_within(5000, 1, 800), (800, 1));
    }

    #[tokio::test]
    async fn test_large_png_is_downscaled_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("person.png");
        image::RgbImage::from_pixel(1600, 400, image::Rgb([200, 10, 10]))
            .save(&path)
            .unwrap();

        let url = encode_for_upload(&path).await.unwrap();
        let encoded = url.strip_prefix("data:image/jpeg;base64,").unwrap();
        let decoded = image::load_from_memory(&BASE64.decode(encoded).unwrap()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 200));
    }

    #[tokio::test]
    async fn test_undecodable_file_is_sent_raw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garment.webp");
        std::fs::write(&path, b"not really an image").unwrap();

        let url = encode_for_upload(&path).await.unwrap();
        assert!(url.starts_with("data:image/webp;base64,"));
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let err = encode_for_upload(Path::new("/nonexistent/img.jpg"))
            .await
            .unwrap_err();
        assert!(err.contains("Failed to read image"));
    }
}
