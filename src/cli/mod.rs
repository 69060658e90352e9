//! Interactive shell
//!
//! A thin front end over the core task: parses lines, forwards them as core
//! commands and prints the outcome. Every enable/disable decision comes from
//! [`presentation::project`](crate::presentation::project).

pub mod command;
pub mod render;

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::{CoreController, CoreEvent};
use crate::presentation::{project, PresentationState};
use crate::ssh::{AuthMethod, ConnectionState, SessionInfo, SshConfig};

pub use command::{parse, CliCommand, CommandError, HELP_TEXT};

const NOT_CONNECTED: &str = "Not connected to server";

/// Whether the shell keeps reading after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Line-oriented shell writing to `W`
pub struct Shell<W> {
    controller: CoreController,
    session: Option<SessionInfo>,
    out: W,
}

impl<W: AsyncWrite + Unpin + Send> Shell<W> {
    pub fn new(controller: CoreController, out: W) -> Self {
        Self {
            controller,
            session: None,
            out,
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Current presentation state
    pub fn view(&mut self) -> PresentationState {
        let state = self.controller.state();
        if state == ConnectionState::Disconnected {
            self.session = None;
        }
        project(state, self.session.as_ref())
    }

    async fn say(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        self.out.write_all(text.as_ref().as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await
    }

    async fn prompt(&mut self) -> io::Result<()> {
        let prompt = if self.view().file_ops_enabled {
            match self.controller.working_directory().await {
                Ok(wd) => format!("sftp:{}> ", wd),
                Err(e) => {
                    debug!("Working directory unavailable for prompt: {}", e);
                    "sftp> ".to_string()
                }
            }
        } else {
            "sftp> ".to_string()
        };
        self.out.write_all(prompt.as_bytes()).await?;
        self.out.flush().await
    }

    /// Read commands from `input` until EOF, `quit` or Ctrl-C at the prompt.
    /// Ctrl-C while a command runs cancels the transfer in flight.
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R) -> io::Result<()> {
        let mut lines = input.lines();
        let printer = spawn_progress_printer(self.controller.subscribe());

        self.say("KAT-ftp SFTP client").await?;
        self.say("Type 'help' for available commands").await?;

        loop {
            self.prompt().await?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    self.say("").await?;
                    None
                }
            };
            let Some(line) = line else {
                break;
            };

            let command = match parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    self.say(e.to_string()).await?;
                    continue;
                }
            };

            let controller = self.controller.clone();
            let flow = {
                let exec = self.execute(command);
                tokio::pin!(exec);
                loop {
                    tokio::select! {
                        flow = &mut exec => break flow?,
                        _ = tokio::signal::ctrl_c() => {
                            if controller.cancel_transfer() {
                                info!("Transfer cancellation requested");
                            }
                        }
                    }
                }
            };
            if flow == Flow::Quit {
                break;
            }
        }

        printer.abort();
        Ok(())
    }

    /// Run one command against the core
    pub async fn execute(&mut self, command: CliCommand) -> io::Result<Flow> {
        let needs_session = matches!(
            command,
            CliCommand::Ls { .. }
                | CliCommand::Pwd
                | CliCommand::Upload { .. }
                | CliCommand::Download { .. }
                | CliCommand::Delete { .. }
                | CliCommand::Mkdir { .. }
                | CliCommand::Rmdir { .. }
                | CliCommand::BookmarkSave { .. }
        );
        if needs_session && !self.view().file_ops_enabled {
            self.say(NOT_CONNECTED).await?;
            return Ok(Flow::Continue);
        }

        match command {
            CliCommand::Connect {
                host,
                username,
                password,
                port,
            } => {
                let config = SshConfig::new(host, port, username, AuthMethod::password(password));
                match self.controller.connect(config).await {
                    Ok(info) => {
                        self.say(format!("Connected to {}", info.address())).await?;
                        self.session = Some(info);
                    }
                    Err(e) => self.say(format!("Connection failed: {}", e)).await?,
                }
            }
            CliCommand::ConnectKey {
                host,
                username,
                key_path,
                port,
            } => {
                let config = SshConfig::new(host, port, username, AuthMethod::key(key_path, None));
                match self.controller.connect(config).await {
                    Ok(info) => {
                        self.say(format!("Connected to {} using key authentication", info.address()))
                            .await?;
                        self.session = Some(info);
                    }
                    Err(e) => self.say(format!("Connection failed: {}", e)).await?,
                }
            }
            CliCommand::Open { name, secret } => match self.controller.open_bookmark(&name, secret).await {
                Ok(info) => {
                    self.say(format!("Connected to {} ({})", info.address(), name)).await?;
                    self.session = Some(info);
                }
                Err(e) => self.say(format!("Connection failed: {}", e)).await?,
            },
            CliCommand::Disconnect => {
                self.controller.disconnect().await;
                self.session = None;
                self.say("Disconnected from server").await?;
            }
            CliCommand::Ls { path } => {
                let path = path.unwrap_or_else(|| ".".to_string());
                match self.controller.list_remote(path.clone()).await {
                    Ok(entries) => {
                        let text = render::listing(&path, &entries);
                        self.say(text.trim_end()).await?;
                    }
                    Err(e) => self.say(format!("List directory failed: {}", e)).await?,
                }
            }
            CliCommand::Lls { path } => {
                let path = path.unwrap_or_else(|| ".".to_string());
                match self.controller.list_local(path.clone()).await {
                    Ok(entries) => {
                        let text = render::listing(&path, &entries);
                        self.say(text.trim_end()).await?;
                    }
                    Err(e) => self.say(format!("List local directory failed: {}", e)).await?,
                }
            }
            CliCommand::Pwd => match self.controller.working_directory().await {
                Ok(wd) => self.say(wd).await?,
                Err(e) => self.say(format!("Get working directory failed: {}", e)).await?,
            },
            CliCommand::Upload { local, remote } => {
                match self.controller.upload(local.clone(), remote).await {
                    Ok(task) => {
                        self.say(format!("Successfully uploaded {} to {}", local, task.destination))
                            .await?
                    }
                    Err(e) if e.is_cancelled() => self.say("Upload cancelled").await?,
                    Err(e) => self.say(format!("Upload failed: {}", e)).await?,
                }
            }
            CliCommand::Download { remote, local } => {
                match self.controller.download(remote.clone(), local).await {
                    Ok(task) => {
                        self.say(format!("Successfully downloaded {} to {}", remote, task.destination))
                            .await?
                    }
                    Err(e) if e.is_cancelled() => self.say("Download cancelled").await?,
                    Err(e) => self.say(format!("Download failed: {}", e)).await?,
                }
            }
            CliCommand::Delete { path } => match self.controller.delete(path.clone()).await {
                Ok(()) => self.say(format!("Successfully deleted {}", path)).await?,
                Err(e) => self.say(format!("Delete failed: {}", e)).await?,
            },
            CliCommand::Mkdir { path } => match self.controller.mkdir(path.clone()).await {
                Ok(()) => self.say(format!("Successfully created directory {}", path)).await?,
                Err(e) => self.say(format!("Make directory failed: {}", e)).await?,
            },
            CliCommand::Rmdir { path } => match self.controller.rmdir(path.clone()).await {
                Ok(()) => self.say(format!("Successfully removed directory {}", path)).await?,
                Err(e) => self.say(format!("Remove directory failed: {}", e)).await?,
            },
            CliCommand::Bookmarks => match self.controller.bookmarks().await {
                Ok(bookmarks) => {
                    let text = render::bookmarks(&bookmarks);
                    self.say(text.trim_end()).await?;
                }
                Err(e) => self.say(format!("Load bookmarks failed: {}", e)).await?,
            },
            CliCommand::BookmarkSave { name } => match self.controller.bookmark_current(name).await {
                Ok(bookmark) => self.say(format!("Bookmark saved: {}", bookmark.name)).await?,
                Err(e) => self.say(format!("Save bookmark failed: {}", e)).await?,
            },
            CliCommand::BookmarkDelete { name } => match self.controller.delete_bookmark(name.clone()).await {
                Ok(true) => self.say(format!("Bookmark deleted: {}", name)).await?,
                Ok(false) => self.say(format!("No bookmark named {}", name)).await?,
                Err(e) => self.say(format!("Delete bookmark failed: {}", e)).await?,
            },
            CliCommand::Help => self.say(HELP_TEXT).await?,
            CliCommand::Quit => {
                self.say("Goodbye!").await?;
                return Ok(Flow::Quit);
            }
        }

        Ok(Flow::Continue)
    }
}

/// Print transfer progress on stderr, one update per whole percent
fn spawn_progress_printer(mut events: broadcast::Receiver<CoreEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_percent: Option<u64> = None;
        loop {
            match events.recv().await {
                Ok(CoreEvent::TransferProgress(progress)) => {
                    let percent = progress.percentage().map(|p| p as u64);
                    if percent.is_none() || percent != last_percent {
                        last_percent = percent;
                        eprint!("\r{}", render::progress(&progress));
                    }
                }
                Ok(CoreEvent::TransferFinished(_)) => {
                    if last_percent.take().is_some() {
                        eprintln!();
                    }
                }
                Ok(CoreEvent::StateChanged(state)) => debug!("Connection state: {:?}", state),
                Err(RecvError::Lagged(skipped)) => debug!("Progress printer skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::BookmarkStore;
    use crate::core::{spawn_core_task, CoreSettings};
    use crate::sftp::remote::testing::session_in;
    use crate::ssh::{ConnectionManager, KnownHostsStore};
    use tempfile::tempdir;

    fn shell(temp: &std::path::Path, connected: bool) -> Shell<Vec<u8>> {
        let known_hosts = KnownHostsStore::with_path(temp.join("known_hosts"));
        let mut manager = ConnectionManager::with_known_hosts(Arc::new(known_hosts));
        if connected {
            let remote = temp.join("remote");
            std::fs::create_dir_all(&remote).unwrap();
            manager.adopt(session_in(&remote));
        }
        let controller = spawn_core_task(manager, BookmarkStore::in_dir(temp), CoreSettings::default());
        Shell::new(controller, Vec::new())
    }

    fn output(shell: Shell<Vec<u8>>) -> String {
        String::from_utf8(shell.into_output()).unwrap()
    }

    #[tokio::test]
    async fn test_file_commands_need_connection() {
        let temp = tempdir().unwrap();
        let mut sh = shell(temp.path(), false);

        assert!(!sh.view().file_ops_enabled);
        for command in ["ls", "pwd", "upload a b", "download a b", "delete a", "mkdir a", "rmdir a"] {
            let command = parse(command).unwrap().unwrap();
            assert_eq!(sh.execute(command).await.unwrap(), Flow::Continue);
        }

        let out = output(sh);
        assert_eq!(out.matches(NOT_CONNECTED).count(), 7);
    }

    #[tokio::test]
    async fn test_connected_listing() {
        let temp = tempdir().unwrap();
        let mut sh = shell(temp.path(), true);
        std::fs::write(temp.path().join("remote").join("notes.txt"), b"hello").unwrap();

        assert!(sh.view().file_ops_enabled);
        sh.execute(CliCommand::Ls { path: None }).await.unwrap();
        sh.execute(CliCommand::Pwd).await.unwrap();
        sh.execute(CliCommand::Mkdir { path: "/inbox".to_string() }).await.unwrap();

        let out = output(sh);
        assert!(out.contains("Listing directory: ."));
        assert!(out.contains("FILE\t5         \t"));
        assert!(out.contains("\tnotes.txt\n"));
        assert!(out.contains("/\n"));
        assert!(out.contains("Successfully created directory /inbox"));
    }

    #[tokio::test]
    async fn test_disconnect_updates_view() {
        let temp = tempdir().unwrap();
        let mut sh = shell(temp.path(), true);

        sh.execute(CliCommand::Disconnect).await.unwrap();
        assert!(!sh.view().file_ops_enabled);
        assert_eq!(sh.view().status, "Disconnected");
        sh.execute(CliCommand::Ls { path: None }).await.unwrap();

        let out = output(sh);
        assert!(out.contains("Disconnected from server"));
        assert!(out.ends_with("Not connected to server\n"));
    }

    #[tokio::test]
    async fn test_run_script() {
        let temp = tempdir().unwrap();
        let mut sh = shell(temp.path(), false);

        let script: &[u8] = b"help\n\nbogus\nconnect h u p notaport\nbookmarks\nquit\nls\n";
        sh.run(script).await.unwrap();

        let out = output(sh);
        assert!(out.contains("Available commands:"));
        assert!(out.contains("Unknown command: bogus"));
        assert!(out.contains("Invalid port number: notaport"));
        assert!(out.contains("No bookmarks saved"));
        assert!(out.contains("sftp> "));
        assert!(out.ends_with("Goodbye!\n"));
    }
}
