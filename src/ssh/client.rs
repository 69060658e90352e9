//! SSH Client implementation using russh

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::PublicKey;
use russh_sftp::client::SftpSession as RusshSftpSession;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::config::{Credentials, HostKeyPolicy, SshConfig};
use super::error::SshError;
use super::known_hosts::{HostKeyVerification, KnownHostsStore};
use super::session::{Session, SessionInfo};
use crate::sftp::remote::SftpRemote;

/// Dials, authenticates and opens the SFTP subsystem for one [`SshConfig`]
pub struct SshClient {
    config: SshConfig,
    known_hosts: Arc<KnownHostsStore>,
}

impl SshClient {
    pub fn new(config: SshConfig, known_hosts: Arc<KnownHostsStore>) -> Self {
        Self {
            config,
            known_hosts,
        }
    }

    /// Connect to the SSH server and return a session with an open SFTP channel
    pub async fn connect(self) -> Result<Session, SshError> {
        // Key files are checked before any network I/O
        let credentials = self.config.auth.load_credentials().await?;

        let addr = self.config.address();
        let timeout = Duration::from_secs(self.config.timeout_secs);

        info!("Connecting to SSH server at {}", addr);

        let addrs: Vec<SocketAddr> = tokio::time::timeout(
            timeout,
            tokio::net::lookup_host((self.config.host.as_str(), self.config.port)),
        )
        .await
        .map_err(|_| SshError::Timeout(format!("Resolving {} timed out", addr)))?
        .map_err(|e| SshError::ConnectionFailed(format!("Failed to resolve {}: {}", addr, e)))?
        .collect();

        let stream = tokio::time::timeout(timeout, connect_any(&addrs))
            .await
            .map_err(|_| SshError::Timeout(format!("Connection to {} timed out", addr)))?
            .map_err(|e| SshError::ConnectionFailed(format!("Failed to connect to {}: {}", addr, e)))?;

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = ClientHandler::new(
            self.config.host.clone(),
            self.config.port,
            self.config.host_key_policy,
            self.known_hosts.clone(),
        );

        let mut handle = tokio::time::timeout(
            timeout,
            client::connect_stream(Arc::new(ssh_config), stream, handler),
        )
        .await
        .map_err(|_| SshError::Timeout(format!("Handshake with {} timed out", addr)))?
        .map_err(|e| match e {
            SshError::HostKeyRejected(_) => e,
            other => SshError::ConnectionFailed(other.to_string()),
        })?;

        debug!("SSH handshake completed with {}", addr);

        if let Err(e) = self.authenticate(&mut handle, credentials).await {
            close_transport(&handle).await;
            return Err(e);
        }

        info!("SSH authentication successful for {}@{}", self.config.username, addr);

        let sftp = match open_sftp(&handle).await {
            Ok(sftp) => sftp,
            Err(e) => {
                // Do not leave a half-open transport behind
                close_transport(&handle).await;
                return Err(e);
            }
        };

        info!("SFTP subsystem opened on {}", addr);

        let info = SessionInfo {
            host: self.config.host.clone(),
            port: self.config.port,
            username: self.config.username.clone(),
            auth_kind: self.config.auth.kind(),
            key_path: self.config.auth.key_path().map(str::to_string),
        };

        Ok(Session::new(info, Box::new(SftpRemote::new(sftp)), Some(handle)))
    }

    async fn authenticate(
        &self,
        handle: &mut Handle<ClientHandler>,
        credentials: Credentials,
    ) -> Result<(), SshError> {
        let username = &self.config.username;

        let result = match credentials {
            Credentials::Password(password) => handle
                .authenticate_password(username, password)
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?,
            Credentials::PublicKey(key) => {
                // RSA keys need the strongest hash both sides agree on
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
                    .flatten();
                let key_with_hash = PrivateKeyWithHashAlg::new(key, hash_alg);

                handle
                    .authenticate_publickey(username, key_with_hash)
                    .await
                    .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
            }
        };

        if !result.success() {
            return Err(SshError::AuthenticationFailed(
                "Authentication rejected by server".to_string(),
            ));
        }
        Ok(())
    }
}

/// Open a session channel and start the `sftp` subsystem on it
async fn open_sftp(handle: &Handle<ClientHandler>) -> Result<RusshSftpSession, SshError> {
    let channel = handle
        .channel_open_session()
        .await
        .map_err(|e| SshError::SftpUnavailable(format!("Failed to open channel: {}", e)))?;

    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| SshError::SftpUnavailable(format!("Failed to request SFTP subsystem: {}", e)))?;

    RusshSftpSession::new(channel.into_stream())
        .await
        .map_err(|e| SshError::SftpUnavailable(e.to_string()))
}

/// Best-effort transport shutdown
pub(crate) async fn close_transport(handle: &Handle<ClientHandler>) {
    if let Err(e) = handle
        .disconnect(russh::Disconnect::ByApplication, "Session closed", "en")
        .await
    {
        warn!("Error while closing SSH transport: {}", e);
    }
}

/// Client handler for russh callbacks; decides whether the server's host key
/// is accepted according to the configured [`HostKeyPolicy`]
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: Arc<KnownHostsStore>,
}

impl ClientHandler {
    pub fn new(
        host: String,
        port: u16,
        policy: HostKeyPolicy,
        known_hosts: Arc<KnownHostsStore>,
    ) -> Self {
        Self {
            host,
            port,
            policy,
            known_hosts,
        }
    }

    /// Host key decision, separated from the russh callback for testing
    pub fn evaluate_host_key(&self, server_public_key: &PublicKey) -> Result<bool, SshError> {
        if self.policy == HostKeyPolicy::InsecureAcceptAny {
            warn!(
                "Host key verification DISABLED for {}:{}; accepting {} without checking",
                self.host,
                self.port,
                KnownHostsStore::fingerprint(server_public_key)
            );
            return Ok(true);
        }

        match self.known_hosts.verify(&self.host, self.port, server_public_key) {
            HostKeyVerification::Verified => {
                info!("Host key verified for {}:{}", self.host, self.port);
                Ok(true)
            }
            HostKeyVerification::Unknown { fingerprint } => match self.policy {
                HostKeyPolicy::Strict => {
                    warn!(
                        "Unknown host key for {}:{} (fingerprint: {}), strict mode rejects it",
                        self.host, self.port, fingerprint
                    );
                    Err(SshError::HostKeyRejected(format!(
                        "unknown host {}:{} (fingerprint {}). Add it to {:?} or relax the host key policy",
                        self.host,
                        self.port,
                        fingerprint,
                        self.known_hosts.path()
                    )))
                }
                _ => {
                    info!(
                        "New host {}:{}, adding to known_hosts (fingerprint: {})",
                        self.host, self.port, fingerprint
                    );
                    if let Err(e) = self.known_hosts.add_host(&self.host, self.port, server_public_key) {
                        warn!("Failed to save host key: {}", e);
                    }
                    Ok(true)
                }
            },
            HostKeyVerification::Changed {
                expected_fingerprint,
                actual_fingerprint,
            } => {
                warn!(
                    "HOST KEY CHANGED for {}:{}! Expected {}, got {}",
                    self.host, self.port, expected_fingerprint, actual_fingerprint
                );
                Err(SshError::HostKeyRejected(format!(
                    "key for {}:{} has changed (expected {}, got {}). \
                     If the change is legitimate, remove the old entry from {:?}",
                    self.host,
                    self.port,
                    expected_fingerprint,
                    actual_fingerprint,
                    self.known_hosts.path()
                )))
            }
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        self.evaluate_host_key(server_public_key)
    }
}

/// Dial each resolved address in order, returning the first that accepts
async fn connect_any(addrs: &[SocketAddr]) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                debug!("TCP connected to {}", addr);
                return Ok(stream);
            }
            Err(e) => {
                debug!("TCP connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address resolved")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::config::AuthMethod;
    use tempfile::tempdir;

    const KEY_A: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8g";
    const KEY_B: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIGVmZ2hpamtsbW5vcHFyc3R1dnd4eXp7fH1+f4CBgoOE";

    #[tokio::test]
    async fn test_connect_any_falls_through_to_next_address() {
        // Bound then dropped: nothing listens there any more
        let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_addr = closed.local_addr().unwrap();
        drop(closed);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_addr = listener.local_addr().unwrap();

        let stream = connect_any(&[closed_addr, open_addr]).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), open_addr);
    }

    #[tokio::test]
    async fn test_connect_any_without_addresses() {
        let err = connect_any(&[]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    fn handler(policy: HostKeyPolicy, store: Arc<KnownHostsStore>) -> ClientHandler {
        ClientHandler::new("example.com".to_string(), 22, policy, store)
    }

    #[test]
    fn test_strict_rejects_unknown_host() {
        let temp = tempdir().unwrap();
        let store = Arc::new(KnownHostsStore::with_path(temp.path().join("known_hosts")));
        let key = russh::keys::parse_public_key_base64(KEY_A).unwrap();

        let result = handler(HostKeyPolicy::Strict, store).evaluate_host_key(&key);
        assert!(matches!(result, Err(SshError::HostKeyRejected(_))));
    }

    #[test]
    fn test_accept_new_records_then_rejects_change() {
        let temp = tempdir().unwrap();
        let store = Arc::new(KnownHostsStore::with_path(temp.path().join("known_hosts")));
        let key_a = russh::keys::parse_public_key_base64(KEY_A).unwrap();
        let key_b = russh::keys::parse_public_key_base64(KEY_B).unwrap();

        let h = handler(HostKeyPolicy::AcceptNew, store.clone());
        assert!(h.evaluate_host_key(&key_a).unwrap());
        assert!(h.evaluate_host_key(&key_a).unwrap());
        assert!(matches!(
            h.evaluate_host_key(&key_b),
            Err(SshError::HostKeyRejected(_))
        ));
    }

    #[test]
    fn test_insecure_accepts_changed_key_without_recording() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("known_hosts");
        std::fs::write(&path, format!("example.com ssh-ed25519 {}\n", KEY_A)).unwrap();
        let store = Arc::new(KnownHostsStore::with_path(path.clone()));
        let key_b = russh::keys::parse_public_key_base64(KEY_B).unwrap();

        let h = handler(HostKeyPolicy::InsecureAcceptAny, store);
        assert!(h.evaluate_host_key(&key_b).unwrap());
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(!contents.contains(KEY_B));
    }

    #[tokio::test]
    async fn test_connect_refused_is_dial_error() {
        let temp = tempdir().unwrap();
        let store = Arc::new(KnownHostsStore::with_path(temp.path().join("known_hosts")));
        // Port 1 on loopback is closed in any sane test environment
        let config = SshConfig::new("127.0.0.1", 1, "nobody", AuthMethod::password("x")).with_timeout(5);

        let err = SshClient::new(config, store).connect().await.err().unwrap();
        assert!(err.is_dial_error(), "unexpected error: {}", err);
    }
}
