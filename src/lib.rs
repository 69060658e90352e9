//! KAT-ftp - An interactive SFTP client
//!
//! Built with Rust, russh and russh-sftp. The core (connection lifecycle,
//! directory listing, streamed transfers and bookmark storage) runs on a
//! single tokio task; front ends drive it through a [`core::CoreController`].

pub mod cli;
pub mod config;
pub mod core;
pub mod presentation;
pub mod sftp;
pub mod ssh;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging
///
/// `RUST_LOG` wins over `default_filter`. Output goes to stderr so log lines
/// stay out of the shell's stdout.
pub fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
