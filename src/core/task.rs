//! Core task loop

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{ActiveTransfer, CoreCommand, CoreController, CoreError, CoreEvent, CoreSettings};
use crate::config::{Bookmark, BookmarkStore};
use crate::sftp::path_utils::{download_target, upload_target};
use crate::sftp::{lister, ops, TransferControl, TransferEngine, TransferTask};
use crate::ssh::{AuthKind, ConnectionManager, SessionInfo, SshConfig, SshError};

const COMMAND_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 256;

/// Spawn the core task
///
/// Consumes ownership of the manager and returns a [`CoreController`] for
/// sending commands. The task ends on [`CoreCommand::Shutdown`] or when every
/// controller is dropped; any open session is closed on the way out.
pub fn spawn_core_task(
    manager: ConnectionManager,
    store: BookmarkStore,
    settings: CoreSettings,
) -> CoreController {
    spawn_core_task_with_engine(manager, store, settings, TransferEngine::default())
}

pub(crate) fn spawn_core_task_with_engine(
    manager: ConnectionManager,
    store: BookmarkStore,
    settings: CoreSettings,
    engine: TransferEngine,
) -> CoreController {
    let (cmd_tx, cmd_rx) = mpsc::channel::<CoreCommand>(COMMAND_QUEUE);
    let (event_tx, _) = broadcast::channel::<CoreEvent>(EVENT_QUEUE);
    let active_transfer: ActiveTransfer = Arc::new(Mutex::new(None));

    // Forward state transitions as events
    let state_rx = manager.subscribe();
    let mut forward_rx = manager.subscribe();
    let state_events = event_tx.clone();
    tokio::spawn(async move {
        while forward_rx.changed().await.is_ok() {
            let state = *forward_rx.borrow_and_update();
            let _ = state_events.send(CoreEvent::StateChanged(state));
        }
    });

    let core = Core {
        manager,
        store,
        settings,
        engine,
        event_tx: event_tx.clone(),
        active_transfer: active_transfer.clone(),
    };
    tokio::spawn(core.run(cmd_rx));

    CoreController {
        cmd_tx,
        event_tx,
        state_rx,
        active_transfer,
    }
}

struct Core {
    manager: ConnectionManager,
    store: BookmarkStore,
    settings: CoreSettings,
    engine: TransferEngine,
    event_tx: broadcast::Sender<CoreEvent>,
    active_transfer: ActiveTransfer,
}

impl Core {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<CoreCommand>) {
        info!("Core task started");
        let mut shutdown_ack = None;

        loop {
            match cmd_rx.recv().await {
                Some(CoreCommand::Shutdown { reply_tx }) => {
                    info!("Shutdown requested");
                    shutdown_ack = Some(reply_tx);
                    break;
                }
                Some(cmd) => self.handle(cmd).await,
                None => {
                    // All senders dropped
                    info!("All controllers dropped");
                    break;
                }
            }
        }

        // Callers still waiting get their oneshot dropped, which reads as Stopped
        cmd_rx.close();
        while cmd_rx.try_recv().is_ok() {}

        self.manager.disconnect().await;
        info!("Core task terminated");
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    async fn handle(&mut self, cmd: CoreCommand) {
        match cmd {
            CoreCommand::Connect { config, reply_tx } => {
                let result = self.connect(config).await;
                send(reply_tx, result, "connect");
            }
            CoreCommand::Disconnect { reply_tx } => {
                self.manager.disconnect().await;
                let _ = reply_tx.send(());
            }
            CoreCommand::ListRemote { path, reply_tx } => {
                let result = self.manager.list(&path).await.map_err(CoreError::from);
                send(reply_tx, result, "list_remote");
            }
            CoreCommand::ListLocal { path, reply_tx } => {
                let result = lister::list_local(&path).await.map_err(CoreError::from);
                send(reply_tx, result, "list_local");
            }
            CoreCommand::WorkingDirectory { reply_tx } => {
                let result = self.manager.working_directory().await.map_err(CoreError::from);
                send(reply_tx, result, "working_directory");
            }
            CoreCommand::Upload {
                local,
                remote,
                reply_tx,
            } => {
                let remote = upload_target(Path::new(&local), &remote);
                let result = self.transfer(TransferTask::upload(local, remote)).await;
                send(reply_tx, result, "upload");
            }
            CoreCommand::Download {
                remote,
                local,
                reply_tx,
            } => {
                let local = download_target(&remote, &local);
                let task = TransferTask::download(remote, local.to_string_lossy());
                let result = self.transfer(task).await;
                send(reply_tx, result, "download");
            }
            CoreCommand::Delete { path, reply_tx } => {
                let result = match self.manager.session() {
                    Ok(session) => ops::delete_file(session, &path).await.map_err(CoreError::from),
                    Err(e) => Err(e.into()),
                };
                send(reply_tx, result, "delete");
            }
            CoreCommand::Mkdir { path, reply_tx } => {
                let result = match self.manager.session() {
                    Ok(session) => ops::make_dir(session, &path).await.map_err(CoreError::from),
                    Err(e) => Err(e.into()),
                };
                send(reply_tx, result, "mkdir");
            }
            CoreCommand::Rmdir { path, reply_tx } => {
                let result = match self.manager.session() {
                    Ok(session) => ops::remove_dir(session, &path).await.map_err(CoreError::from),
                    Err(e) => Err(e.into()),
                };
                send(reply_tx, result, "rmdir");
            }
            CoreCommand::ListBookmarks { reply_tx } => {
                let _ = reply_tx.send(self.store.load().await);
            }
            CoreCommand::SaveBookmark { bookmark, reply_tx } => {
                let result = self.store.upsert(bookmark).await.map_err(CoreError::from);
                send(reply_tx, result, "save_bookmark");
            }
            CoreCommand::BookmarkCurrent { name, reply_tx } => {
                let result = match self.manager.session_info() {
                    Some(info) => {
                        let bookmark = bookmark_from_session(name, info);
                        self.store.upsert(bookmark).await.map_err(CoreError::from)
                    }
                    None => Err(SshError::NotConnected.into()),
                };
                send(reply_tx, result, "bookmark_current");
            }
            CoreCommand::DeleteBookmark { name, reply_tx } => {
                let result = self.store.delete(&name).await.map_err(CoreError::from);
                send(reply_tx, result, "delete_bookmark");
            }
            CoreCommand::OpenBookmark {
                name,
                secret,
                reply_tx,
            } => {
                let result = self.open_bookmark(&name, secret.as_deref()).await;
                send(reply_tx, result, "open_bookmark");
            }
            CoreCommand::Shutdown { .. } => {}
        }
    }

    async fn connect(&mut self, config: SshConfig) -> Result<SessionInfo, CoreError> {
        let config = config
            .with_timeout(self.settings.timeout_secs)
            .with_host_key_policy(self.settings.host_key_policy);
        let info = self.manager.connect(config).await?;
        Ok(info.clone())
    }

    async fn open_bookmark(&mut self, name: &str, secret: Option<&str>) -> Result<SessionInfo, CoreError> {
        let bookmark = self
            .store
            .get(name)
            .await
            .ok_or_else(|| CoreError::BookmarkNotFound(name.to_string()))?;
        let config = bookmark.to_ssh_config(secret)?;
        debug!("Opening bookmark {} ({}@{})", name, bookmark.username, config.address());
        self.connect(config).await
    }

    async fn transfer(&mut self, mut task: TransferTask) -> Result<TransferTask, CoreError> {
        let session = self.manager.session()?;

        let control = Arc::new(TransferControl::new());
        *self.active_transfer.lock() = Some(control.clone());

        let events = self.event_tx.clone();
        let result = self
            .engine
            .run(session, &mut task, &control, |progress| {
                let _ = events.send(CoreEvent::TransferProgress(progress.clone()));
            })
            .await;

        *self.active_transfer.lock() = None;
        let _ = self.event_tx.send(CoreEvent::TransferFinished(task.clone()));

        match result {
            Ok(_) => Ok(task),
            Err(e) => Err(e.into()),
        }
    }
}

fn bookmark_from_session(name: String, info: &SessionInfo) -> Bookmark {
    match (info.auth_kind, &info.key_path) {
        (AuthKind::Key, Some(key_path)) => {
            Bookmark::key(name, info.host.clone(), info.port, info.username.clone(), key_path.clone())
        }
        _ => Bookmark::password(name, info.host.clone(), info.port, info.username.clone()),
    }
}

fn send<T>(reply_tx: oneshot::Sender<Result<T, CoreError>>, result: Result<T, CoreError>, op: &str) {
    if let Err(e) = &result {
        debug!("{} failed: {}", op, e);
    }
    if reply_tx.send(result).is_err() {
        warn!("Caller dropped before receiving {} result", op);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sftp::remote::testing::session_in;
    use crate::sftp::{SftpError, TransferState};
    use crate::ssh::{ConnectionState, KnownHostsStore};
    use tempfile::tempdir;

    struct Fixture {
        temp: tempfile::TempDir,
        controller: CoreController,
    }

    impl Fixture {
        fn local(&self) -> std::path::PathBuf {
            self.temp.path().join("local")
        }

        fn remote(&self) -> std::path::PathBuf {
            self.temp.path().join("remote")
        }
    }

    fn fixture(connected: bool) -> Fixture {
        let temp = tempdir().unwrap();
        std::fs::create_dir(temp.path().join("local")).unwrap();
        std::fs::create_dir(temp.path().join("remote")).unwrap();

        let known_hosts = KnownHostsStore::with_path(temp.path().join("known_hosts"));
        let mut manager = ConnectionManager::with_known_hosts(Arc::new(known_hosts));
        if connected {
            manager.adopt(session_in(&temp.path().join("remote")));
        }
        let store = BookmarkStore::in_dir(&temp.path().join("config"));
        let controller = spawn_core_task_with_engine(
            manager,
            store,
            CoreSettings::default(),
            TransferEngine::with_chunk_size(1024),
        );
        Fixture { temp, controller }
    }

    #[tokio::test]
    async fn test_disconnected_operations() {
        let fx = fixture(false);
        let ctl = &fx.controller;

        assert!(ctl.list_remote(".").await.unwrap_err().is_not_connected());
        assert!(ctl.working_directory().await.unwrap_err().is_not_connected());
        assert!(ctl.delete("/x").await.unwrap_err().is_not_connected());
        assert!(ctl.mkdir("/x").await.unwrap_err().is_not_connected());
        assert!(ctl.rmdir("/x").await.unwrap_err().is_not_connected());
        assert!(ctl.bookmark_current("x").await.unwrap_err().is_not_connected());

        let local = fx.local().join("f");
        std::fs::write(&local, b"x").unwrap();
        let err = ctl
            .upload(local.to_string_lossy().to_string(), "/f".to_string())
            .await
            .unwrap_err();
        assert!(err.is_not_connected());
        assert!(!ctl.cancel_transfer());

        // Local listing needs no session
        assert_eq!(ctl.list_local(fx.local()).await.unwrap().len(), 1);

        ctl.disconnect().await;
        assert!(ctl.is_running());
    }

    #[tokio::test]
    async fn test_transfer_round_trip_with_events() {
        let fx = fixture(true);
        let ctl = &fx.controller;
        let mut events = ctl.subscribe();

        let data: Vec<u8> = (0..5000u32).map(|i| (i % 256) as u8).collect();
        let local = fx.local().join("data.bin");
        std::fs::write(&local, &data).unwrap();

        let task = ctl
            .upload(local.to_string_lossy().to_string(), "/".to_string())
            .await
            .unwrap();
        assert_eq!(task.state, TransferState::Completed);
        assert_eq!(task.destination, "/data.bin");
        assert_eq!(std::fs::read(fx.remote().join("data.bin")).unwrap(), data);

        let mut progress = Vec::new();
        loop {
            match tokio::time::timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap() {
                CoreEvent::TransferProgress(p) => progress.push(p.transferred_bytes),
                CoreEvent::TransferFinished(t) => {
                    assert_eq!(t.id, task.id);
                    break;
                }
                CoreEvent::StateChanged(_) => {}
            }
        }
        assert_eq!(progress.len(), 5);
        assert_eq!(progress.last().copied(), Some(5000));

        let back_dir = fx.local().join("back");
        std::fs::create_dir(&back_dir).unwrap();
        let task = ctl
            .download("/data.bin".to_string(), back_dir.to_string_lossy().to_string())
            .await
            .unwrap();
        assert_eq!(task.transferred, 5000);
        assert_eq!(std::fs::read(back_dir.join("data.bin")).unwrap(), data);
    }

    #[tokio::test]
    async fn test_remote_mutations() {
        let fx = fixture(true);
        let ctl = &fx.controller;

        ctl.mkdir("/dir").await.unwrap();
        assert!(fx.remote().join("dir").is_dir());
        assert_eq!(ctl.list_remote("/").await.unwrap().len(), 1);
        ctl.rmdir("/dir").await.unwrap();

        std::fs::write(fx.remote().join("f"), b"x").unwrap();
        ctl.delete("/f").await.unwrap();
        assert!(!fx.remote().join("f").exists());

        let err = ctl.delete("/f").await.unwrap_err();
        assert!(matches!(err, CoreError::Sftp(SftpError::FileNotFound(_))));
        assert_eq!(ctl.working_directory().await.unwrap(), "/");
    }

    #[tokio::test]
    async fn test_bookmarks() {
        let fx = fixture(true);
        let ctl = &fx.controller;

        let saved = ctl.bookmark_current("here").await.unwrap();
        assert_eq!(saved.host, "test.invalid");
        assert_eq!(saved.port, "22");
        assert!(!saved.use_ssh_key);

        ctl.save_bookmark(Bookmark::key("box", "10.0.0.9", 22, "root", "/nonexistent/key"))
            .await
            .unwrap();
        let names: Vec<String> = ctl.bookmarks().await.unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["here", "box"]);

        let err = ctl.open_bookmark("here", None).await.unwrap_err();
        assert!(matches!(err, CoreError::Bookmark(_)));

        // Key is read before any dialing
        let err = ctl.open_bookmark("box", None).await.unwrap_err();
        assert!(matches!(err, CoreError::Ssh(SshError::KeyRead { .. })), "unexpected error: {}", err);

        let err = ctl.open_bookmark("nope", None).await.unwrap_err();
        assert!(matches!(err, CoreError::BookmarkNotFound(_)));

        assert!(ctl.delete_bookmark("box").await.unwrap());
        assert!(!ctl.delete_bookmark("box").await.unwrap());
        assert_eq!(ctl.bookmarks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_publishes_state() {
        let fx = fixture(true);
        let ctl = &fx.controller;
        let mut events = ctl.subscribe();

        ctl.disconnect().await;

        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if let CoreEvent::StateChanged(state) = event {
                assert_eq!(state, ConnectionState::Disconnected);
                break;
            }
        }
        assert!(ctl.list_remote(".").await.unwrap_err().is_not_connected());
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let fx = fixture(true);
        let ctl = fx.controller.clone();

        ctl.shutdown().await;
        let err = ctl.list_remote(".").await.unwrap_err();
        assert!(matches!(err, CoreError::Stopped));
    }
}
