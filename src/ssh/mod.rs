//! SSH module - handles SSH connections and sessions
//!
//! This module provides the connection side of the client using the russh
//! library: credential loading, dialing with a bounded timeout, host key
//! verification via ~/.ssh/known_hosts, and the lifecycle of the single
//! session owned by a [`ConnectionManager`].

mod client;
mod config;
mod error;
pub mod known_hosts;
mod manager;
mod session;

pub use client::{ClientHandler, SshClient};
pub use config::{
    AuthKind, AuthMethod, Credentials, HostKeyPolicy, SshConfig, DEFAULT_PORT,
    DEFAULT_TIMEOUT_SECS,
};
pub use error::SshError;
pub use known_hosts::{HostKeyVerification, KnownHostsStore};
pub use manager::{ConnectionManager, ConnectionState};
pub use session::{Session, SessionInfo};
