//! Connection lifecycle for a single remote session
//!
//! State machine: `Disconnected -> Connecting -> Connected -> Disconnected`.
//! `Connecting` only exists for the duration of a `connect` call. There is no
//! reconnecting state: a dropped transport surfaces as an error from the next
//! operation and a fresh `connect` is required.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::client::SshClient;
use super::config::{AuthMethod, SshConfig};
use super::error::SshError;
use super::known_hosts::KnownHostsStore;
use super::session::{Session, SessionInfo};
use crate::sftp::error::SftpError;
use crate::sftp::types::FileEntry;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns at most one [`Session`] at a time
pub struct ConnectionManager {
    session: Option<Session>,
    known_hosts: Arc<KnownHostsStore>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    /// Manager verifying host keys against `~/.ssh/known_hosts`
    pub fn new() -> Self {
        Self::with_known_hosts(Arc::new(KnownHostsStore::new()))
    }

    pub fn with_known_hosts(known_hosts: Arc<KnownHostsStore>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            session: None,
            known_hosts,
            state_tx,
        }
    }

    /// Open a session. Any existing session is closed first. On failure the
    /// manager is left disconnected.
    pub async fn connect(&mut self, config: SshConfig) -> Result<&SessionInfo, SshError> {
        if self.session.is_some() {
            debug!("connect() while connected, closing existing session first");
            self.disconnect().await;
        }

        self.set_state(ConnectionState::Connecting);

        match SshClient::new(config, self.known_hosts.clone()).connect().await {
            Ok(session) => {
                info!("Connected to {}", session.info().address());
                let session = self.session.insert(session);
                self.state_tx.send_replace(ConnectionState::Connected);
                Ok(session.info())
            }
            Err(e) => {
                warn!("Connection failed: {}", e);
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Password authentication
    pub async fn connect_password(
        &mut self,
        host: &str,
        username: &str,
        password: &str,
        port: u16,
    ) -> Result<&SessionInfo, SshError> {
        self.connect(SshConfig::new(host, port, username, AuthMethod::password(password)))
            .await
    }

    /// Private key authentication. The key is read and parsed before dialing.
    pub async fn connect_with_key(
        &mut self,
        host: &str,
        username: &str,
        key_path: &str,
        port: u16,
    ) -> Result<&SessionInfo, SshError> {
        self.connect(SshConfig::new(host, port, username, AuthMethod::key(key_path, None)))
            .await
    }

    /// Close the session if there is one. Never fails.
    pub async fn disconnect(&mut self) {
        match self.session.take() {
            Some(session) => {
                session.close().await;
                self.set_state(ConnectionState::Disconnected);
            }
            None => debug!("disconnect() while not connected, nothing to do"),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn session_info(&self) -> Option<&SessionInfo> {
        self.session.as_ref().map(Session::info)
    }

    /// The open session, or `NotConnected`
    pub fn session(&self) -> Result<&Session, SftpError> {
        self.session.as_ref().ok_or(SftpError::NotConnected)
    }

    /// List a remote directory on the open session
    pub async fn list(&self, path: &str) -> Result<Vec<FileEntry>, SftpError> {
        crate::sftp::lister::list_remote(self.session()?, path).await
    }

    /// Remote working directory of the open session
    pub async fn working_directory(&self) -> Result<String, SftpError> {
        crate::sftp::lister::working_directory(self.session()?).await
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Connection state {:?} -> {:?}", previous, state);
        }
    }

    /// Install an already-open session (test backends)
    #[cfg(test)]
    pub(crate) fn adopt(&mut self, session: Session) {
        self.session = Some(session);
        self.set_state(ConnectionState::Connected);
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::remote::testing::session_in;
    use tempfile::tempdir;

    fn manager(dir: &std::path::Path) -> ConnectionManager {
        ConnectionManager::with_known_hosts(Arc::new(KnownHostsStore::with_path(
            dir.join("known_hosts"),
        )))
    }

    #[tokio::test]
    async fn test_fresh_manager_is_disconnected() {
        let temp = tempdir().unwrap();
        let mut mgr = manager(temp.path());

        assert!(!mgr.is_connected());
        assert_eq!(mgr.state(), ConnectionState::Disconnected);

        // Disconnect on a fresh manager is a no-op
        mgr.disconnect().await;
        mgr.disconnect().await;
        assert!(!mgr.is_connected());
    }

    #[tokio::test]
    async fn test_list_when_disconnected() {
        let temp = tempdir().unwrap();
        let mgr = manager(temp.path());

        assert!(matches!(mgr.list(".").await, Err(SftpError::NotConnected)));
        assert!(matches!(mgr.working_directory().await, Err(SftpError::NotConnected)));
        assert_eq!(SftpError::NotConnected.to_string(), "not connected");
    }

    #[tokio::test]
    async fn test_connect_unreachable_host() {
        let temp = tempdir().unwrap();
        let mut mgr = manager(temp.path());
        let mut state_rx = mgr.subscribe();

        let err = mgr
            .connect(SshConfig::new("127.0.0.1", 1, "testuser", AuthMethod::password("testpass")).with_timeout(5))
            .await
            .err()
            .unwrap();

        assert!(err.is_dial_error(), "unexpected error: {}", err);
        assert!(!mgr.is_connected());
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(state_rx.has_changed().unwrap());
        assert_eq!(*state_rx.borrow_and_update(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_with_missing_key() {
        let temp = tempdir().unwrap();
        let mut mgr = manager(temp.path());
        let key_path = temp.path().join("nonexistent_key");

        // Host is never dialed: the key is read first
        let err = mgr
            .connect_with_key("192.0.2.1", "testuser", &key_path.to_string_lossy(), 22)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, SshError::KeyRead { .. }), "unexpected error: {}", err);
        assert!(!mgr.is_connected());
    }

    #[tokio::test]
    async fn test_adopted_session_lifecycle() {
        let temp = tempdir().unwrap();
        let remote_root = temp.path().join("remote");
        std::fs::create_dir(&remote_root).unwrap();
        std::fs::write(remote_root.join("a.txt"), b"abc").unwrap();

        let mut mgr = manager(temp.path());
        mgr.adopt(session_in(&remote_root));

        assert!(mgr.is_connected());
        assert_eq!(mgr.state(), ConnectionState::Connected);
        assert_eq!(mgr.session_info().unwrap().host, "test.invalid");

        let entries = mgr.list(".").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.txt");

        mgr.disconnect().await;
        assert!(!mgr.is_connected());
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        assert!(matches!(mgr.list(".").await, Err(SftpError::NotConnected)));
    }
}
