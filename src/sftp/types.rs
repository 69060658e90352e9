//! SFTP data types

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One directory entry. A snapshot, rebuilt on every listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name (not full path)
    pub name: String,
    pub kind: EntryKind,
    /// Size in bytes; meaningless for directories
    pub size: u64,
    /// Last modification time, Unix epoch when unknown
    pub modified: DateTime<Utc>,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Build from SFTP attributes (`mtime` in seconds since the epoch)
    pub(crate) fn from_remote(name: String, is_dir: bool, size: Option<u64>, mtime: Option<u32>) -> Self {
        Self {
            name,
            kind: EntryKind::from_is_dir(is_dir),
            size: size.unwrap_or(0),
            modified: mtime
                .and_then(|t| DateTime::from_timestamp(i64::from(t), 0))
                .unwrap_or_default(),
        }
    }

    /// Build from local filesystem metadata
    pub(crate) fn from_local(name: String, metadata: &std::fs::Metadata) -> Self {
        Self {
            name,
            kind: EntryKind::from_is_dir(metadata.is_dir()),
            size: metadata.len(),
            modified: metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| DateTime::<Utc>::from(SystemTime::UNIX_EPOCH)),
        }
    }
}

/// Directory entry classification. Symlinks show up as whatever the
/// transport resolves them to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    fn from_is_dir(is_dir: bool) -> Self {
        if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Transfer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    /// Created, not started
    Pending,
    /// Currently transferring
    InProgress,
    /// Completed successfully
    Completed,
    /// Failed with error
    Failed,
    /// Cancelled by user
    Cancelled,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Completed | TransferState::Failed | TransferState::Cancelled
        )
    }
}

/// One copy operation between the local and remote filesystems
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferTask {
    /// Unique transfer ID
    pub id: String,
    pub direction: TransferDirection,
    /// Local path for uploads, remote path for downloads
    pub source: String,
    /// Remote path for uploads, local path for downloads
    pub destination: String,
    /// Bytes written to the destination so far
    pub transferred: u64,
    pub state: TransferState,
    /// Error message if failed
    pub error: Option<String>,
}

impl TransferTask {
    pub fn new(direction: TransferDirection, source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            direction,
            source: source.into(),
            destination: destination.into(),
            transferred: 0,
            state: TransferState::Pending,
            error: None,
        }
    }

    pub fn upload(local_path: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self::new(TransferDirection::Upload, local_path, remote_path)
    }

    pub fn download(remote_path: impl Into<String>, local_path: impl Into<String>) -> Self {
        Self::new(TransferDirection::Download, remote_path, local_path)
    }
}

/// Transfer progress notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferProgress {
    pub id: String,
    pub direction: TransferDirection,
    /// Total bytes to transfer, when the source size is known
    pub total_bytes: Option<u64>,
    pub transferred_bytes: u64,
}

impl TransferProgress {
    /// Progress percentage (0-100), `None` when the total is unknown
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some((self.transferred_bytes as f64 / total as f64) * 100.0),
            None => None,
        }
    }
}

/// Constants for SFTP operations
pub mod constants {
    /// Chunk size for file transfers (64 KB)
    pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
}
