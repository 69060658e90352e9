//! Remote mutations: delete a file, create or remove a directory

use tracing::info;

use super::error::SftpError;
use crate::ssh::Session;

/// Delete a remote file
pub async fn delete_file(session: &Session, path: &str) -> Result<(), SftpError> {
    session.fs().remove_file(path).await?;
    info!(host = %session.info().host, path, "Deleted remote file");
    Ok(())
}

/// Create a remote directory. The parent must exist.
pub async fn make_dir(session: &Session, path: &str) -> Result<(), SftpError> {
    session.fs().create_dir(path).await?;
    info!(host = %session.info().host, path, "Created remote directory");
    Ok(())
}

/// Remove an empty remote directory
pub async fn remove_dir(session: &Session, path: &str) -> Result<(), SftpError> {
    session.fs().remove_dir(path).await?;
    info!(host = %session.info().host, path, "Removed remote directory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::remote::testing::session_in;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_mkdir_rmdir_delete() {
        let temp = tempdir().unwrap();
        let session = session_in(temp.path());

        make_dir(&session, "/new").await.unwrap();
        assert!(temp.path().join("new").is_dir());

        std::fs::write(temp.path().join("new/f"), b"x").unwrap();
        // Not empty
        assert!(remove_dir(&session, "/new").await.is_err());

        delete_file(&session, "/new/f").await.unwrap();
        remove_dir(&session, "/new").await.unwrap();
        assert!(!temp.path().join("new").exists());
    }

    #[tokio::test]
    async fn test_delete_missing_file() {
        let temp = tempdir().unwrap();
        let session = session_in(temp.path());

        let err = delete_file(&session, "/ghost").await.unwrap_err();
        assert!(matches!(err, SftpError::FileNotFound(_)));
    }
}
