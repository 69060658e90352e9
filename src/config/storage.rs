//! Bookmark storage
//!
//! Handles reading/writing the bookmark file and the one-time migration from
//! the legacy location. The file is a pretty-printed JSON array, replaced
//! atomically on every save.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::paths::{bookmarks_file, BOOKMARKS_FILE_NAME};
use super::types::{Bookmark, BookmarkError};

/// Bookmark storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] BookmarkError),
}

/// Result of [`migrate_legacy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Legacy file copied to the new location
    Migrated,
    /// New file already present, nothing copied
    AlreadyPresent,
    /// No legacy file
    NoLegacyFile,
}

/// Insert `bookmark`, replacing an entry with the same name in place
pub fn upsert_bookmark(bookmarks: &mut Vec<Bookmark>, bookmark: Bookmark) {
    match bookmarks.iter_mut().find(|b| b.name == bookmark.name) {
        Some(existing) => *existing = bookmark,
        None => bookmarks.push(bookmark),
    }
}

/// Remove the entry called `name`. Returns whether one was removed.
pub fn remove_bookmark(bookmarks: &mut Vec<Bookmark>, name: &str) -> bool {
    let before = bookmarks.len();
    bookmarks.retain(|b| b.name != name);
    bookmarks.len() != before
}

/// Create a new file for writing with owner-only permissions on Unix.
/// Fails if `path` already exists, so the mode always applies.
async fn open_private(path: &Path) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path).await
}

/// Copy the legacy bookmark file to `new_path` if `old_path` exists and
/// `new_path` does not. Never overwrites and never deletes the legacy file.
pub async fn migrate_legacy(old_path: &Path, new_path: &Path) -> Result<MigrationOutcome, StorageError> {
    if !fs::try_exists(old_path).await? {
        return Ok(MigrationOutcome::NoLegacyFile);
    }

    if fs::try_exists(new_path).await? {
        debug!("Bookmark file {:?} already present, skipping migration", new_path);
        return Ok(MigrationOutcome::AlreadyPresent);
    }

    let data = match fs::read(old_path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MigrationOutcome::NoLegacyFile),
        Err(e) => return Err(StorageError::Io(e)),
    };

    if let Some(parent) = new_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut file = match open_private(new_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Ok(MigrationOutcome::AlreadyPresent);
        }
        Err(e) => return Err(StorageError::Io(e)),
    };
    file.write_all(&data).await?;
    file.sync_all().await?;

    info!("Migrated bookmarks from {:?} to {:?}", old_path, new_path);
    Ok(MigrationOutcome::Migrated)
}

/// Bookmark storage manager
#[derive(Debug, Clone)]
pub struct BookmarkStore {
    path: PathBuf,
}

impl BookmarkStore {
    /// Create a new store with the default path
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            path: bookmarks_file()?,
        })
    }

    /// Create a store with a custom file path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Create a store inside a custom config directory
    pub fn in_dir(dir: &Path) -> Self {
        Self::with_path(dir.join(BOOKMARKS_FILE_NAME))
    }

    /// Get bookmark file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the config directory exists
    async fn ensure_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Load bookmarks from disk, in stored order.
    /// A missing, unreadable or corrupted file yields an empty set.
    pub async fn load(&self) -> Vec<Bookmark> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => match serde_json::from_str::<Vec<Bookmark>>(&contents) {
                Ok(bookmarks) => bookmarks,
                Err(e) => {
                    warn!("Bookmark file {:?} is corrupted, starting empty: {}", self.path, e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Failed to read bookmark file {:?}: {}", self.path, e);
                Vec::new()
            }
        }
    }

    /// Save the full set to disk
    pub async fn save(&self, bookmarks: &[Bookmark]) -> Result<(), StorageError> {
        self.ensure_dir().await?;

        // Write to temp file first, then rename (atomic write)
        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(bookmarks)?;

        // A leftover temp file would keep its old permissions
        match fs::remove_file(&temp_path).await {
            Ok(()) => debug!("Removed stale temp file {:?}", temp_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Io(e)),
        }
        let mut file = open_private(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;

        debug!("Saved {} bookmarks to {:?}", bookmarks.len(), self.path);
        Ok(())
    }

    /// Validate and store `bookmark`, replacing any entry with the same name.
    /// Returns the stored (normalized) bookmark.
    pub async fn upsert(&self, bookmark: Bookmark) -> Result<Bookmark, StorageError> {
        let bookmark = bookmark.normalize()?;
        let mut bookmarks = self.load().await;
        upsert_bookmark(&mut bookmarks, bookmark.clone());
        self.save(&bookmarks).await?;
        info!("Bookmark saved: {}", bookmark.name);
        Ok(bookmark)
    }

    /// Delete the bookmark called `name`. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut bookmarks = self.load().await;
        let removed = remove_bookmark(&mut bookmarks, name);
        if removed {
            self.save(&bookmarks).await?;
            info!("Bookmark deleted: {}", name);
        }
        Ok(removed)
    }

    /// Look up a bookmark by name
    pub async fn get(&self, name: &str) -> Option<Bookmark> {
        self.load().await.into_iter().find(|b| b.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_nonexistent() {
        let temp = tempdir().unwrap();
        let store = BookmarkStore::in_dir(temp.path());
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = tempdir().unwrap();
        let store = BookmarkStore::in_dir(&temp.path().join("nested"));

        let bookmarks = vec![
            Bookmark::password("work", "work.example.com", 22, "alice"),
            Bookmark::key("home", "10.0.0.2", 2222, "bob", "/home/bob/.ssh/id_ed25519"),
        ];
        store.save(&bookmarks).await.unwrap();

        assert_eq!(store.load().await, bookmarks);
        assert!(!store.path().with_extension("json.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_replaces_stale_temp_file() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let store = BookmarkStore::in_dir(temp.path());
        let stale = store.path().with_extension("json.tmp");
        std::fs::write(&stale, b"leftover").unwrap();
        std::fs::set_permissions(&stale, std::fs::Permissions::from_mode(0o644)).unwrap();

        let bookmarks = vec![Bookmark::password("a", "h", 22, "u")];
        store.save(&bookmarks).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!stale.exists());
        assert_eq!(store.load().await, bookmarks);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_name() {
        let temp = tempdir().unwrap();
        let store = BookmarkStore::in_dir(temp.path());

        store.upsert(Bookmark::password("a", "h1", 22, "u")).await.unwrap();
        store.upsert(Bookmark::password("b", "h2", 22, "u")).await.unwrap();
        store.upsert(Bookmark::password("a", "h3", 2200, "u")).await.unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "a");
        assert_eq!(loaded[0].host, "h3");
        assert_eq!(loaded[0].port, "2200");
        assert_eq!(loaded[1].name, "b");
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid() {
        let temp = tempdir().unwrap();
        let store = BookmarkStore::in_dir(temp.path());

        let err = store.upsert(Bookmark::password("a", "", 22, "u")).await.unwrap_err();
        assert!(matches!(err, StorageError::Invalid(BookmarkError::MissingField("host"))));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_delete() {
        let temp = tempdir().unwrap();
        let store = BookmarkStore::in_dir(temp.path());
        store.upsert(Bookmark::password("a", "h", 22, "u")).await.unwrap();

        assert!(!store.delete("missing").await.unwrap());
        assert!(store.delete("a").await.unwrap());
        assert!(store.load().await.is_empty());
        assert!(store.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupted_file_loads_empty() {
        let temp = tempdir().unwrap();
        let store = BookmarkStore::in_dir(temp.path());
        std::fs::write(store.path(), b"{not json").unwrap();

        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_migrate_legacy() {
        let temp = tempdir().unwrap();
        let old = temp.path().join(".sftp-client-bookmarks.json");
        let new = temp.path().join("config").join("bookmarks.json");

        assert_eq!(migrate_legacy(&old, &new).await.unwrap(), MigrationOutcome::NoLegacyFile);
        assert!(!new.exists());

        let legacy = br#"[{"name":"x","host":"h","port":"22","username":"u","use_ssh_key":false}]"#;
        std::fs::write(&old, legacy).unwrap();

        assert_eq!(migrate_legacy(&old, &new).await.unwrap(), MigrationOutcome::Migrated);
        assert_eq!(std::fs::read(&new).unwrap(), legacy);
        assert!(old.exists());

        // Second run never overwrites
        std::fs::write(&old, b"[]").unwrap();
        assert_eq!(migrate_legacy(&old, &new).await.unwrap(), MigrationOutcome::AlreadyPresent);
        assert_eq!(std::fs::read(&new).unwrap(), legacy);

        let store = BookmarkStore::with_path(new);
        assert_eq!(store.load().await[0].name, "x");
    }

    #[tokio::test]
    async fn test_migrate_skips_unreadable_legacy_when_present() {
        let temp = tempdir().unwrap();
        // A directory cannot be read as a file
        let old = temp.path().join("legacy-dir");
        std::fs::create_dir(&old).unwrap();
        let new = temp.path().join("bookmarks.json");
        std::fs::write(&new, b"[]").unwrap();

        assert_eq!(migrate_legacy(&old, &new).await.unwrap(), MigrationOutcome::AlreadyPresent);
        assert_eq!(std::fs::read(&new).unwrap(), b"[]");
    }

    #[test]
    fn test_pure_helpers() {
        let mut set = vec![Bookmark::password("a", "h", 22, "u")];
        upsert_bookmark(&mut set, Bookmark::password("b", "h", 22, "u"));
        upsert_bookmark(&mut set, Bookmark::password("a", "other", 22, "u"));
        assert_eq!(set.len(), 2);
        assert_eq!(set[0].host, "other");

        assert!(remove_bookmark(&mut set, "a"));
        assert!(!remove_bookmark(&mut set, "a"));
        assert_eq!(set.len(), 1);
    }
}
