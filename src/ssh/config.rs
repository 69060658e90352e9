//! SSH Configuration

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use russh::keys::PrivateKey;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::SshError;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Default dial timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// SSH connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Authentication method
    pub auth: AuthMethod,

    /// Dial timeout in seconds (TCP connect + handshake)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// How the server's host key is checked
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
}

impl SshConfig {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, auth: AuthMethod) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            host_key_policy: HostKeyPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    /// `host:port` as used for dialing and logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Authentication methods supported
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Password authentication
    Password { password: String },

    /// SSH key authentication
    Key {
        /// Path to private key file
        key_path: String,
        /// Optional passphrase for encrypted keys
        passphrase: Option<String>,
    },
}

/// Which credential family a session was opened with. Fixed for the
/// lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    Password,
    Key,
}

/// Transport-level credentials produced from an [`AuthMethod`]
pub enum Credentials {
    Password(String),
    PublicKey(Arc<PrivateKey>),
}

impl AuthMethod {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }

    pub fn key(key_path: impl Into<String>, passphrase: Option<String>) -> Self {
        Self::Key {
            key_path: key_path.into(),
            passphrase,
        }
    }

    pub fn kind(&self) -> AuthKind {
        match self {
            AuthMethod::Password { .. } => AuthKind::Password,
            AuthMethod::Key { .. } => AuthKind::Key,
        }
    }

    /// Key path for key-based auth
    pub fn key_path(&self) -> Option<&str> {
        match self {
            AuthMethod::Key { key_path, .. } => Some(key_path),
            AuthMethod::Password { .. } => None,
        }
    }

    /// Turn the method into credentials the transport can use.
    ///
    /// Key files are read and parsed here, before any network I/O, so a
    /// missing or malformed key fails fast.
    pub async fn load_credentials(&self) -> Result<Credentials, SshError> {
        match self {
            AuthMethod::Password { password } => Ok(Credentials::Password(password.clone())),
            AuthMethod::Key {
                key_path,
                passphrase,
            } => {
                let contents = tokio::fs::read_to_string(Path::new(key_path))
                    .await
                    .map_err(|source| SshError::KeyRead {
                        path: key_path.clone(),
                        source,
                    })?;

                let key = russh::keys::decode_secret_key(&contents, passphrase.as_deref())
                    .map_err(|e| SshError::KeyParse {
                        path: key_path.clone(),
                        message: e.to_string(),
                    })?;

                debug!("Loaded private key from {}", key_path);
                Ok(Credentials::PublicKey(Arc::new(key)))
            }
        }
    }
}

/// Host key verification policy
///
/// - `Strict`: reject hosts missing from known_hosts
/// - `AcceptNew`: trust on first use and record the key, reject changed keys
/// - `InsecureAcceptAny`: accept every key without looking at known_hosts.
///   Only ever enabled explicitly; a warning is logged on each connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    Strict,
    #[default]
    AcceptNew,
    InsecureAcceptAny,
}

impl FromStr for HostKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(HostKeyPolicy::Strict),
            "accept-new" => Ok(HostKeyPolicy::AcceptNew),
            "insecure-accept-any" => Ok(HostKeyPolicy::InsecureAcceptAny),
            other => Err(format!(
                "unknown host key policy '{}' (expected strict, accept-new or insecure-accept-any)",
                other
            )),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
