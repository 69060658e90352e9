//! Core Task
//!
//! This module implements the "single owner" pattern for the connection.
//!
//! # Architecture
//!
//! Only one task owns the [`ConnectionManager`] (and through it the open
//! session). The presentation layer talks to it via [`CoreController`], which
//! sends [`CoreCommand`]s through an mpsc channel and awaits each reply on a
//! oneshot channel. Commands run strictly one at a time, so a session never
//! sees concurrent operations.
//!
//! Notifications (state transitions, transfer progress and completion) are
//! published as [`CoreEvent`]s on a broadcast channel.
//!
//! # Usage
//!
//! ```ignore
//! let controller = spawn_core_task(ConnectionManager::new(), store, CoreSettings::default());
//!
//! controller.connect(config).await?;
//! let entries = controller.list_remote(".").await?;
//! controller.upload("report.pdf".into(), "/srv/inbox/".into()).await?;
//! ```

mod task;

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::{Bookmark, BookmarkError, StorageError};
use crate::sftp::{FileEntry, SftpError, TransferControl, TransferProgress, TransferTask};
use crate::ssh::{ConnectionState, HostKeyPolicy, SessionInfo, SshConfig, SshError, DEFAULT_TIMEOUT_SECS};

pub use task::spawn_core_task;

/// Errors returned through the controller
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Ssh(#[from] SshError),

    #[error(transparent)]
    Sftp(#[from] SftpError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Bookmark(#[from] BookmarkError),

    #[error("Bookmark not found: {0}")]
    BookmarkNotFound(String),

    #[error("Core task stopped")]
    Stopped,
}

impl CoreError {
    pub fn is_not_connected(&self) -> bool {
        matches!(
            self,
            CoreError::Sftp(SftpError::NotConnected) | CoreError::Ssh(SshError::NotConnected)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Sftp(SftpError::TransferCancelled))
    }
}

/// Connection settings applied to every connect the core performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreSettings {
    pub timeout_secs: u64,
    pub host_key_policy: HostKeyPolicy,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            host_key_policy: HostKeyPolicy::default(),
        }
    }
}

/// Notifications published by the core task
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// Connection state transition
    StateChanged(ConnectionState),
    /// A chunk of the running transfer was written
    TransferProgress(TransferProgress),
    /// A transfer reached a terminal state
    TransferFinished(TransferTask),
}

type Reply<T> = oneshot::Sender<Result<T, CoreError>>;

/// Commands sent to the core task
pub enum CoreCommand {
    Connect {
        config: SshConfig,
        reply_tx: Reply<SessionInfo>,
    },
    Disconnect {
        reply_tx: oneshot::Sender<()>,
    },
    ListRemote {
        path: String,
        reply_tx: Reply<Vec<FileEntry>>,
    },
    ListLocal {
        path: PathBuf,
        reply_tx: Reply<Vec<FileEntry>>,
    },
    WorkingDirectory {
        reply_tx: Reply<String>,
    },
    Upload {
        local: String,
        remote: String,
        reply_tx: Reply<TransferTask>,
    },
    Download {
        remote: String,
        local: String,
        reply_tx: Reply<TransferTask>,
    },
    Delete {
        path: String,
        reply_tx: Reply<()>,
    },
    Mkdir {
        path: String,
        reply_tx: Reply<()>,
    },
    Rmdir {
        path: String,
        reply_tx: Reply<()>,
    },
    ListBookmarks {
        reply_tx: oneshot::Sender<Vec<Bookmark>>,
    },
    SaveBookmark {
        bookmark: Bookmark,
        reply_tx: Reply<Bookmark>,
    },
    /// Bookmark the parameters of the open session
    BookmarkCurrent {
        name: String,
        reply_tx: Reply<Bookmark>,
    },
    DeleteBookmark {
        name: String,
        reply_tx: Reply<bool>,
    },
    OpenBookmark {
        name: String,
        /// Password, or key passphrase for key bookmarks
        secret: Option<String>,
        reply_tx: Reply<SessionInfo>,
    },
    Shutdown {
        reply_tx: oneshot::Sender<()>,
    },
}

/// Slot holding the control of the transfer in flight, shared with the task
pub(crate) type ActiveTransfer = Arc<Mutex<Option<Arc<TransferControl>>>>;

/// Controller for the core task
#[derive(Clone)]
pub struct CoreController {
    cmd_tx: mpsc::Sender<CoreCommand>,
    event_tx: broadcast::Sender<CoreEvent>,
    state_rx: watch::Receiver<ConnectionState>,
    active_transfer: ActiveTransfer,
}

impl CoreController {
    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to core notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.event_tx.subscribe()
    }

    /// Check if the core task is still running
    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Cancel the transfer in flight, if any. Bypasses the command queue.
    pub fn cancel_transfer(&self) -> bool {
        match self.active_transfer.lock().as_ref() {
            Some(control) => {
                control.cancel();
                true
            }
            None => false,
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> CoreCommand,
    ) -> Result<T, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| CoreError::Stopped)?;
        reply_rx.await.map_err(|_| CoreError::Stopped)
    }

    pub async fn connect(&self, config: SshConfig) -> Result<SessionInfo, CoreError> {
        self.request(|reply_tx| CoreCommand::Connect { config, reply_tx })
            .await?
    }

    /// Close the session. Never fails.
    pub async fn disconnect(&self) {
        let _ = self
            .request(|reply_tx| CoreCommand::Disconnect { reply_tx })
            .await;
    }

    pub async fn list_remote(&self, path: impl Into<String>) -> Result<Vec<FileEntry>, CoreError> {
        let path = path.into();
        self.request(|reply_tx| CoreCommand::ListRemote { path, reply_tx })
            .await?
    }

    pub async fn list_local(&self, path: impl Into<PathBuf>) -> Result<Vec<FileEntry>, CoreError> {
        let path = path.into();
        self.request(|reply_tx| CoreCommand::ListLocal { path, reply_tx })
            .await?
    }

    pub async fn working_directory(&self) -> Result<String, CoreError> {
        self.request(|reply_tx| CoreCommand::WorkingDirectory { reply_tx })
            .await?
    }

    /// Upload a local file. A remote path ending in `/` receives the local
    /// file name.
    pub async fn upload(&self, local: String, remote: String) -> Result<TransferTask, CoreError> {
        self.request(|reply_tx| CoreCommand::Upload {
            local,
            remote,
            reply_tx,
        })
        .await?
    }

    /// Download a remote file. An existing local directory receives the
    /// remote file name.
    pub async fn download(&self, remote: String, local: String) -> Result<TransferTask, CoreError> {
        self.request(|reply_tx| CoreCommand::Download {
            remote,
            local,
            reply_tx,
        })
        .await?
    }

    pub async fn delete(&self, path: impl Into<String>) -> Result<(), CoreError> {
        let path = path.into();
        self.request(|reply_tx| CoreCommand::Delete { path, reply_tx })
            .await?
    }

    pub async fn mkdir(&self, path: impl Into<String>) -> Result<(), CoreError> {
        let path = path.into();
        self.request(|reply_tx| CoreCommand::Mkdir { path, reply_tx })
            .await?
    }

    pub async fn rmdir(&self, path: impl Into<String>) -> Result<(), CoreError> {
        let path = path.into();
        self.request(|reply_tx| CoreCommand::Rmdir { path, reply_tx })
            .await?
    }

    pub async fn bookmarks(&self) -> Result<Vec<Bookmark>, CoreError> {
        self.request(|reply_tx| CoreCommand::ListBookmarks { reply_tx })
            .await
    }

    pub async fn save_bookmark(&self, bookmark: Bookmark) -> Result<Bookmark, CoreError> {
        self.request(|reply_tx| CoreCommand::SaveBookmark { bookmark, reply_tx })
            .await?
    }

    pub async fn bookmark_current(&self, name: impl Into<String>) -> Result<Bookmark, CoreError> {
        let name = name.into();
        self.request(|reply_tx| CoreCommand::BookmarkCurrent { name, reply_tx })
            .await?
    }

    pub async fn delete_bookmark(&self, name: impl Into<String>) -> Result<bool, CoreError> {
        let name = name.into();
        self.request(|reply_tx| CoreCommand::DeleteBookmark { name, reply_tx })
            .await?
    }

    pub async fn open_bookmark(
        &self,
        name: impl Into<String>,
        secret: Option<String>,
    ) -> Result<SessionInfo, CoreError> {
        let name = name.into();
        self.request(|reply_tx| CoreCommand::OpenBookmark {
            name,
            secret,
            reply_tx,
        })
        .await?
    }

    /// Stop the core task. Returns once any open session is closed.
    pub async fn shutdown(&self) {
        let _ = self
            .request(|reply_tx| CoreCommand::Shutdown { reply_tx })
            .await;
    }
}
