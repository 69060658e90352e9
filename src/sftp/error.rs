//! SFTP Error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SftpError {
    #[error("not connected")]
    NotConnected,

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Remote I/O error on {path}: {message}")]
    RemoteIo { path: String, message: String },

    #[error("Local I/O error on {path}: {source}")]
    LocalIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Transfer cancelled")]
    TransferCancelled,
}

impl SftpError {
    pub fn remote(path: impl Into<String>, message: impl ToString) -> Self {
        SftpError::RemoteIo {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn local(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        SftpError::LocalIo {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Map a russh-sftp error for `path` to our error type
    pub fn from_protocol(err: russh_sftp::client::error::Error, path: &str) -> Self {
        let err_str = err.to_string();
        if err_str.contains("No such file") || err_str.contains("not found") {
            SftpError::FileNotFound(path.to_string())
        } else if err_str.contains("Permission denied") {
            SftpError::PermissionDenied(path.to_string())
        } else {
            SftpError::remote(path, err_str)
        }
    }

    /// True for failures on the remote side of an operation
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SftpError::FileNotFound(_) | SftpError::PermissionDenied(_) | SftpError::RemoteIo { .. }
        )
    }
}
