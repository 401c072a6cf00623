//! Export of try-on results to the user's picture gallery

use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Asks the platform for write access to the gallery
pub trait StoragePermission: Send + Sync {
    fn request(&self) -> PermissionStatus;
}

/// Grants access when the gallery directory can be created and is writable
#[derive(Debug, Clone)]
pub struct DirectoryPermission {
    dir: PathBuf,
}

impl DirectoryPermission {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl StoragePermission for DirectoryPermission {
    fn request(&self) -> PermissionStatus {
        if std::fs::create_dir_all(&self.dir).is_err() {
            return PermissionStatus::Denied;
        }
        match std::fs::metadata(&self.dir) {
            Ok(meta) if !meta.permissions().readonly() => PermissionStatus::Granted,
            _ => PermissionStatus::Denied,
        }
    }
}

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("Gallery permission required")]
    PermissionDenied,
    #[error("Could not save to gallery: {0}")]
    Io(String),
}

pub struct Gallery {
    dir: PathBuf,
    permission: Arc<dyn StoragePermission>,
}

impl Gallery {
    pub fn new(dir: impl Into<PathBuf>, permission: Arc<dyn StoragePermission>) -> Self {
        Self {
            dir: dir.into(),
            permission,
        }
    }

    /// Gallery at the default pictures location, gated on directory access
    pub fn default_location() -> Result<Self, String> {
        let dir = crate::paths::get_gallery_dir()?;
        let permission = Arc::new(DirectoryPermission::new(dir.clone()));
        Ok(Self::new(dir, permission))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copies `image` into the gallery and returns the new asset path
    pub async fn save(&self, image: &Path) -> Result<PathBuf, GalleryError> {
        if self.permission.request() != PermissionStatus::Granted {
            error!("[save_to_gallery] Permission denied for {:?}", self.dir);
            return Err(GalleryError::PermissionDenied);
        }

        let file_name = image
            .file_name()
            .ok_or_else(|| GalleryError::Io(format!("Not a file: {}", image.display())))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| GalleryError::Io(format!("Failed to create gallery directory: {}", e)))?;

        let target = self.dir.join(file_name);
        tokio::fs::copy(image, &target)
            .await
            .map_err(|e| GalleryError::Io(format!("Failed to copy image: {}", e)))?;

        info!("[save_to_gallery] Saved {:?}", target);
        Ok(target)
    }
}
