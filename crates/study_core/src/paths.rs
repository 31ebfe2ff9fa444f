use std::path::PathBuf;

const APP_DIR_NAME: &str = "study-buddy";

/// Base cache directory for the app (`<cache>/study-buddy`).
pub fn app_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

/// Scratch directory that holds document copies before they are uploaded.
pub fn default_scratch_dir() -> PathBuf {
    app_cache_dir().join("uploads")
}
