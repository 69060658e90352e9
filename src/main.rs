//! KAT-ftp shell
//!
//! Interactive SFTP client over SSH.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use kat_ftp::cli::Shell;
use kat_ftp::config::{self, BookmarkStore, MigrationOutcome};
use kat_ftp::core::{spawn_core_task, CoreSettings};
use kat_ftp::ssh::{ConnectionManager, HostKeyPolicy, KnownHostsStore, DEFAULT_TIMEOUT_SECS};
use tokio::io::BufReader;

/// KAT-ftp - browse, upload and download files over SFTP.
#[derive(Parser, Debug)]
#[command(name = "kat-ftp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding bookmarks.json
    #[arg(long, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Host key verification: strict, accept-new or insecure-accept-any
    #[arg(long, value_name = "POLICY", default_value = "accept-new")]
    pub host_key_policy: HostKeyPolicy,

    /// known_hosts file (default: ~/.ssh/known_hosts)
    #[arg(long, value_name = "FILE")]
    pub known_hosts: Option<PathBuf>,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Log filter, e.g. "debug" or "kat_ftp=trace" (RUST_LOG overrides)
    #[arg(long, value_name = "FILTER", default_value = "warn")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    kat_ftp::init_logging(&cli.log_level);
    tracing::info!("KAT-ftp starting...");

    let store = match &cli.config_dir {
        Some(dir) => {
            tracing::info!("Using config directory: {:?}", dir);
            BookmarkStore::in_dir(dir)
        }
        None => {
            let store = BookmarkStore::new()?;
            migrate_bookmarks(&store).await;
            store
        }
    };

    let known_hosts = match cli.known_hosts {
        Some(path) => KnownHostsStore::with_path(path),
        None => KnownHostsStore::new(),
    };
    if cli.host_key_policy == HostKeyPolicy::InsecureAcceptAny {
        tracing::warn!("Host key verification disabled (--host-key-policy insecure-accept-any)");
    }

    let settings = CoreSettings {
        timeout_secs: cli.timeout,
        host_key_policy: cli.host_key_policy,
    };
    let manager = ConnectionManager::with_known_hosts(Arc::new(known_hosts));
    let controller = spawn_core_task(manager, store, settings);

    let mut shell = Shell::new(controller.clone(), tokio::io::stdout());
    let result = shell.run(BufReader::new(tokio::io::stdin())).await;

    controller.shutdown().await;
    result?;
    Ok(())
}

/// One-time copy of the legacy bookmark file. Failures are logged, never fatal.
async fn migrate_bookmarks(store: &BookmarkStore) {
    let legacy = match config::legacy_bookmarks_file() {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!("No legacy bookmark location: {}", e);
            return;
        }
    };

    match config::migrate_legacy(&legacy, store.path()).await {
        Ok(MigrationOutcome::Migrated) => {
            eprintln!("Migrated bookmarks from {} to {}", legacy.display(), store.path().display());
        }
        Ok(outcome) => tracing::debug!("Bookmark migration: {:?}", outcome),
        Err(e) => tracing::warn!("Bookmark migration failed: {}", e),
    }
}
