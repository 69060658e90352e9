//! Directory enumeration on both ends of a session

use std::path::Path;

use tracing::debug;

use super::error::SftpError;
use super::types::FileEntry;
use crate::ssh::Session;

/// List a remote directory in server order. An empty path means the
/// session's default directory.
pub async fn list_remote(session: &Session, path: &str) -> Result<Vec<FileEntry>, SftpError> {
    let path = if path.is_empty() { "." } else { path };
    let entries = session.fs().read_dir(path).await?;
    debug!(host = %session.info().host, path, count = entries.len(), "Listed remote directory");
    Ok(entries)
}

/// The session's current remote directory
pub async fn working_directory(session: &Session) -> Result<String, SftpError> {
    session.fs().canonicalize(".").await
}

/// List a local directory. Never touches the network.
pub async fn list_local(path: impl AsRef<Path>) -> Result<Vec<FileEntry>, SftpError> {
    let path = path.as_ref();
    let mut dir = tokio::fs::read_dir(path)
        .await
        .map_err(|e| SftpError::local(path, e))?;

    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await.map_err(|e| SftpError::local(path, e))? {
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            // Entry vanished between readdir and stat
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(SftpError::local(entry.path(), e)),
        };
        entries.push(FileEntry::from_local(
            entry.file_name().to_string_lossy().to_string(),
            &metadata,
        ));
    }

    debug!(path = %path.display(), count = entries.len(), "Listed local directory");
    Ok(entries)
}
