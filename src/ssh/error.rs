//! SSH Error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SshError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Host key rejected: {0}")]
    HostKeyRejected(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Unable to read private key {path}: {source}")]
    KeyRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse private key {path}: {message}")]
    KeyParse { path: String, message: String },

    #[error("Failed to open SFTP subsystem: {0}")]
    SftpUnavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SSH protocol error: {0}")]
    ProtocolError(String),

    #[error("Not connected")]
    NotConnected,
}

impl SshError {
    /// True for failures that happened before or while establishing the
    /// transport (resolution, TCP, handshake, host key).
    pub fn is_dial_error(&self) -> bool {
        matches!(
            self,
            SshError::ConnectionFailed(_) | SshError::Timeout(_) | SshError::HostKeyRejected(_)
        )
    }
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::ProtocolError(err.to_string())
    }
}
