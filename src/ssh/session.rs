//! SSH Session: one transport plus one SFTP channel

use russh::client::Handle;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::client::{close_transport, ClientHandler};
use super::config::AuthKind;
use crate::sftp::remote::RemoteFs;

/// Identity of an open session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_kind: AuthKind,
    /// Key file used for key auth, kept so the connection can be bookmarked
    pub key_path: Option<String>,
}

impl SessionInfo {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A live, authenticated connection exposing file operations.
///
/// Not safe for concurrent use: callers issue one operation at a time.
pub struct Session {
    info: SessionInfo,
    fs: Box<dyn RemoteFs>,
    /// `None` for sessions whose filesystem is not backed by SSH (tests)
    transport: Option<Handle<ClientHandler>>,
}

impl Session {
    pub(crate) fn new(
        info: SessionInfo,
        fs: Box<dyn RemoteFs>,
        transport: Option<Handle<ClientHandler>>,
    ) -> Self {
        Self {
            info,
            fs,
            transport,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Remote filesystem protocol layer
    pub fn fs(&self) -> &dyn RemoteFs {
        self.fs.as_ref()
    }

    /// Close the SFTP channel, then the transport. Both steps are
    /// best-effort; failures are only logged.
    pub async fn close(self) {
        debug!("Closing session {}", self.info.address());

        if let Err(e) = self.fs.close().await {
            warn!("Error while closing SFTP channel on {}: {}", self.info.address(), e);
        }

        if let Some(handle) = self.transport {
            close_transport(&handle).await;
        }

        info!("Session {} closed", self.info.address());
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field("has_transport", &self.transport.is_some())
            .finish()
    }
}
