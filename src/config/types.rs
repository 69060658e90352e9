//! Bookmark types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ssh::{AuthMethod, SshConfig, DEFAULT_PORT};

/// Bookmark validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookmarkError {
    #[error("Bookmark {0} is required")]
    MissingField(&'static str),

    #[error("SSH key path is required when key authentication is enabled")]
    MissingKeyPath,

    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    #[error("Password is required to connect with bookmark '{0}'")]
    PasswordRequired(String),
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

/// A named, persisted connection profile. Passwords are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub name: String,
    pub host: String,
    /// Kept as text to match the on-disk format
    #[serde(default = "default_port")]
    pub port: String,
    pub username: String,
    #[serde(default)]
    pub use_ssh_key: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_path: String,
}

impl Bookmark {
    /// Password bookmark
    pub fn password(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: port.to_string(),
            username: username.into(),
            use_ssh_key: false,
            key_path: String::new(),
        }
    }

    /// Key bookmark
    pub fn key(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        Self {
            use_ssh_key: true,
            key_path: key_path.into(),
            ..Self::password(name, host, port, username)
        }
    }

    /// Fill defaults and check required fields. An empty port becomes "22";
    /// the key file itself is only checked when connecting.
    pub fn normalize(mut self) -> Result<Self, BookmarkError> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(BookmarkError::MissingField("name"));
        }
        if self.host.trim().is_empty() {
            return Err(BookmarkError::MissingField("host"));
        }
        if self.username.trim().is_empty() {
            return Err(BookmarkError::MissingField("username"));
        }
        if self.port.trim().is_empty() {
            self.port = default_port();
        }
        self.port_number()?;
        if self.use_ssh_key {
            if self.key_path.trim().is_empty() {
                return Err(BookmarkError::MissingKeyPath);
            }
        } else {
            self.key_path.clear();
        }
        Ok(self)
    }

    pub fn port_number(&self) -> Result<u16, BookmarkError> {
        let port = self.port.trim();
        if port.is_empty() {
            return Ok(DEFAULT_PORT);
        }
        port.parse::<u16>()
            .map_err(|_| BookmarkError::InvalidPort(self.port.clone()))
    }

    /// Connection parameters for this bookmark. Password bookmarks need the
    /// password supplied at connect time.
    pub fn to_ssh_config(&self, password: Option<&str>) -> Result<SshConfig, BookmarkError> {
        let port = self.port_number()?;
        let auth = if self.use_ssh_key {
            if self.key_path.is_empty() {
                return Err(BookmarkError::MissingKeyPath);
            }
            AuthMethod::key(self.key_path.clone(), password.map(str::to_string))
        } else {
            match password {
                Some(password) => AuthMethod::password(password),
                None => return Err(BookmarkError::PasswordRequired(self.name.clone())),
            }
        };
        Ok(SshConfig::new(self.host.clone(), port, self.username.clone(), auth))
    }
}
