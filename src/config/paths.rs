//! Configuration locations
//!
//! Config location: `~/.config/KAT-ftp` on every platform, so bookmark files
//! written by earlier releases are found on macOS and Windows too.

use std::path::{Path, PathBuf};

use super::storage::StorageError;

/// Directory name under `~/.config`
pub const APP_DIR_NAME: &str = "KAT-ftp";

/// Bookmark file name inside the config directory
pub const BOOKMARKS_FILE_NAME: &str = "bookmarks.json";

/// Bookmark file of older releases, in the home directory
pub const LEGACY_BOOKMARKS_FILE_NAME: &str = ".sftp-client-bookmarks.json";

/// Config directory below a given home directory
pub fn config_dir_in(home: &Path) -> PathBuf {
    home.join(".config").join(APP_DIR_NAME)
}

/// Get the KAT-ftp configuration directory
pub fn config_dir() -> Result<PathBuf, StorageError> {
    dirs::home_dir()
        .map(|home| config_dir_in(&home))
        .ok_or(StorageError::NoConfigDir)
}

/// Get the bookmarks file path
pub fn bookmarks_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join(BOOKMARKS_FILE_NAME))
}

/// Get the pre-config-dir bookmarks file path
pub fn legacy_bookmarks_file() -> Result<PathBuf, StorageError> {
    dirs::home_dir()
        .map(|home| home.join(LEGACY_BOOKMARKS_FILE_NAME))
        .ok_or(StorageError::NoConfigDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_under_dot_config() {
        let home = Path::new("/home/alice");
        assert_eq!(config_dir_in(home), PathBuf::from("/home/alice/.config/KAT-ftp"));
        assert_eq!(
            config_dir_in(home).join(BOOKMARKS_FILE_NAME),
            PathBuf::from("/home/alice/.config/KAT-ftp/bookmarks.json")
        );
    }
}
