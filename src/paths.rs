//! Path utilities and file system helpers

use std::path::PathBuf;

/// Application identifier used for the data directory name
pub const APP_DIR_NAME: &str = "com.aikadin.app";

/// Gallery album name under the user's pictures directory
pub const GALLERY_ALBUM: &str = "Aikadin";

/// Gets the application data directory
pub fn get_app_data_dir() -> Result<PathBuf, String> {
    dirs::data_dir()
        .map(|p| p.join(APP_DIR_NAME))
        .ok_or_else(|| "Could not find app data directory".to_string())
}

/// Clears all application data
pub fn clear_app_data() -> Result<(), String> {
    let app_dir = get_app_data_dir()?;
    if app_dir.exists() {
        std::fs::remove_dir_all(&app_dir)
            .map_err(|e| format!("Failed to clear app data: {}", e))?;
    }
    Ok(())
}

/// Gets the database file path
pub fn get_db_path() -> Result<PathBuf, String> {
    get_app_data_dir().map(|p| p.join("aikadin.db"))
}

/// Gets the configuration file path
pub fn get_config_path() -> Result<PathBuf, String> {
    get_app_data_dir().map(|p| p.join("config.json"))
}

/// Gets the log file path
pub fn get_log_path() -> Result<PathBuf, String> {
    get_app_data_dir().map(|p| p.join("aikadin.log"))
}

/// Gets the directory where try-on results are written
pub fn get_tryon_output_dir() -> Result<PathBuf, String> {
    get_app_data_dir().map(|p| p.join("TryOn"))
}

/// Gets the public gallery directory (outside private app storage)
pub fn get_gallery_dir() -> Result<PathBuf, String> {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .map(|p| p.join(GALLERY_ALBUM))
        .ok_or_else(|| "Could not find pictures directory".to_string())
}

/// Ensures the parent directory of `path` exists
pub fn ensure_parent_dir(path: &std::path::Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create directory: {}", e))?;
    }
    Ok(())
}
