//! Remote filesystem protocol layer
//!
//! [`RemoteFs`] is the seam between the session and the wire protocol. The
//! production implementation wraps a russh-sftp session; tests plug in a
//! backend rooted in a local temp directory.

use async_trait::async_trait;
use russh_sftp::client::SftpSession as RusshSftpSession;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::error::SftpError;
use super::types::FileEntry;

/// Readable remote file handle
pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable remote file handle
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// File operations a session exposes
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Entries of `path` in server order, without `.` and `..`
    async fn read_dir(&self, path: &str) -> Result<Vec<FileEntry>, SftpError>;

    /// Absolute form of `path`
    async fn canonicalize(&self, path: &str) -> Result<String, SftpError>;

    /// Size of a regular file
    async fn file_size(&self, path: &str) -> Result<Option<u64>, SftpError>;

    async fn open_read(&self, path: &str) -> Result<RemoteReader, SftpError>;

    /// Create or truncate
    async fn create(&self, path: &str) -> Result<RemoteWriter, SftpError>;

    async fn remove_file(&self, path: &str) -> Result<(), SftpError>;

    async fn create_dir(&self, path: &str) -> Result<(), SftpError>;

    /// Remove an empty directory
    async fn remove_dir(&self, path: &str) -> Result<(), SftpError>;

    /// Close the protocol channel
    async fn close(&self) -> Result<(), SftpError>;
}

/// [`RemoteFs`] over an SFTP subsystem channel
pub struct SftpRemote {
    sftp: RusshSftpSession,
}

impl SftpRemote {
    pub fn new(sftp: RusshSftpSession) -> Self {
        Self { sftp }
    }
}

#[async_trait]
impl RemoteFs for SftpRemote {
    async fn read_dir(&self, path: &str) -> Result<Vec<FileEntry>, SftpError> {
        let read_dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| SftpError::from_protocol(e, path))?;

        let entries: Vec<FileEntry> = read_dir
            .filter_map(|entry| {
                let name = entry.file_name();
                if name == "." || name == ".." {
                    return None;
                }
                let metadata = entry.metadata();
                Some(FileEntry::from_remote(
                    name,
                    metadata.is_dir(),
                    metadata.size,
                    metadata.mtime,
                ))
            })
            .collect();

        debug!("Read {} entries from {}", entries.len(), path);
        Ok(entries)
    }

    async fn canonicalize(&self, path: &str) -> Result<String, SftpError> {
        self.sftp
            .canonicalize(path)
            .await
            .map_err(|e| SftpError::from_protocol(e, path))
    }

    async fn file_size(&self, path: &str) -> Result<Option<u64>, SftpError> {
        let metadata = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| SftpError::from_protocol(e, path))?;
        Ok(metadata.size)
    }

    async fn open_read(&self, path: &str) -> Result<RemoteReader, SftpError> {
        let file = self
            .sftp
            .open(path)
            .await
            .map_err(|e| SftpError::from_protocol(e, path))?;
        Ok(Box::new(file))
    }

    async fn create(&self, path: &str) -> Result<RemoteWriter, SftpError> {
        let file = self
            .sftp
            .create(path)
            .await
            .map_err(|e| SftpError::from_protocol(e, path))?;
        Ok(Box::new(file))
    }

    async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| SftpError::from_protocol(e, path))
    }

    async fn create_dir(&self, path: &str) -> Result<(), SftpError> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| SftpError::from_protocol(e, path))
    }

    async fn remove_dir(&self, path: &str) -> Result<(), SftpError> {
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| SftpError::from_protocol(e, path))
    }

    async fn close(&self) -> Result<(), SftpError> {
        self.sftp
            .close()
            .await
            .map_err(|e| SftpError::remote("<session>", e))
    }
}
