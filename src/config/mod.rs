//! Configuration Management Module
//!
//! Handles config locations and persistent storage of connection bookmarks.

pub mod paths;
pub mod storage;
pub mod types;

pub use paths::{bookmarks_file, config_dir, legacy_bookmarks_file};
pub use storage::{
    migrate_legacy, remove_bookmark, upsert_bookmark, BookmarkStore, MigrationOutcome, StorageError,
};
pub use types::{Bookmark, BookmarkError};
