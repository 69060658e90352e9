//! Transfer engine for SFTP operations
//!
//! One upload or download is a chunked byte-stream copy between a local file
//! and a remote file, with cooperative cancellation and progress callbacks.

use std::io;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::constants::DEFAULT_CHUNK_SIZE;
use super::error::SftpError;
use super::types::{TransferDirection, TransferProgress, TransferState, TransferTask};
use crate::ssh::Session;

/// Transfer control signals
#[derive(Debug)]
pub struct TransferControl {
    /// Cancellation signal via watch channel
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl TransferControl {
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            cancel_tx,
            cancel_rx,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

impl Default for TransferControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Check loop helper for cancellation during transfer
pub fn check_transfer_control(control: &TransferControl) -> Result<(), SftpError> {
    if control.is_cancelled() {
        return Err(SftpError::TransferCancelled);
    }
    Ok(())
}

/// Which side of a copy an I/O error came from
enum Endpoint<'a> {
    Local(&'a Path),
    Remote(&'a str),
}

impl Endpoint<'_> {
    fn error(&self, e: io::Error) -> SftpError {
        match self {
            Endpoint::Local(path) => SftpError::local(path, e),
            Endpoint::Remote(path) => SftpError::remote(*path, e),
        }
    }
}

/// Streams single files between the local filesystem and a session
#[derive(Debug, Clone)]
pub struct TransferEngine {
    chunk_size: usize,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransferEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Copy `local_path` to `remote_path`, creating or truncating the remote
    /// file. Returns the number of bytes written.
    pub async fn upload<F>(
        &self,
        session: &Session,
        local_path: &Path,
        remote_path: &str,
        control: &TransferControl,
        on_progress: F,
    ) -> Result<u64, SftpError>
    where
        F: FnMut(u64) + Send,
    {
        info!("Uploading {} to {}", local_path.display(), remote_path);
        check_transfer_control(control)?;

        let mut local_file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| SftpError::local(local_path, e))?;
        let mut remote_file = session.fs().create(remote_path).await?;

        let bytes = self
            .copy(
                &mut local_file,
                Endpoint::Local(local_path),
                &mut remote_file,
                Endpoint::Remote(remote_path),
                control,
                on_progress,
            )
            .await?;

        info!("Upload complete: {} ({} bytes)", remote_path, bytes);
        Ok(bytes)
    }

    /// Copy `remote_path` to `local_path`, creating or truncating the local
    /// file. Returns the number of bytes written.
    pub async fn download<F>(
        &self,
        session: &Session,
        remote_path: &str,
        local_path: &Path,
        control: &TransferControl,
        on_progress: F,
    ) -> Result<u64, SftpError>
    where
        F: FnMut(u64) + Send,
    {
        info!("Downloading {} to {}", remote_path, local_path.display());
        check_transfer_control(control)?;

        let mut remote_file = session.fs().open_read(remote_path).await?;
        let mut local_file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| SftpError::local(local_path, e))?;

        let bytes = self
            .copy(
                &mut remote_file,
                Endpoint::Remote(remote_path),
                &mut local_file,
                Endpoint::Local(local_path),
                control,
                on_progress,
            )
            .await?;

        info!("Download complete: {} ({} bytes)", local_path.display(), bytes);
        Ok(bytes)
    }

    /// Drive `task` to a terminal state. `on_progress` sees every chunk.
    pub async fn run<F>(
        &self,
        session: &Session,
        task: &mut TransferTask,
        control: &TransferControl,
        mut on_progress: F,
    ) -> Result<u64, SftpError>
    where
        F: FnMut(&TransferProgress) + Send,
    {
        task.state = TransferState::InProgress;
        task.transferred = 0;
        task.error = None;

        let total_bytes = self.source_size(session, task).await;
        let id = task.id.clone();
        let direction = task.direction;
        let mut transferred = 0u64;

        let report = |bytes: u64| {
            transferred = bytes;
            on_progress(&TransferProgress {
                id: id.clone(),
                direction,
                total_bytes,
                transferred_bytes: bytes,
            });
        };

        let result = match direction {
            TransferDirection::Upload => {
                self.upload(
                    session,
                    Path::new(&task.source),
                    &task.destination,
                    control,
                    report,
                )
                .await
            }
            TransferDirection::Download => {
                self.download(
                    session,
                    &task.source,
                    Path::new(&task.destination),
                    control,
                    report,
                )
                .await
            }
        };

        match &result {
            Ok(bytes) => {
                task.transferred = *bytes;
                task.state = TransferState::Completed;
            }
            Err(SftpError::TransferCancelled) => {
                task.transferred = transferred;
                task.state = TransferState::Cancelled;
                info!("Transfer {} cancelled at {} bytes", task.id, transferred);
            }
            Err(e) => {
                task.transferred = transferred;
                task.state = TransferState::Failed;
                task.error = Some(e.to_string());
                warn!("Transfer {} failed: {}", task.id, e);
            }
        }

        result
    }

    /// Size of the transfer source, when it can be determined
    async fn source_size(&self, session: &Session, task: &TransferTask) -> Option<u64> {
        match task.direction {
            TransferDirection::Upload => tokio::fs::metadata(&task.source).await.ok().map(|m| m.len()),
            TransferDirection::Download => session.fs().file_size(&task.source).await.ok().flatten(),
        }
    }

    async fn copy<R, W, F>(
        &self,
        reader: &mut R,
        source: Endpoint<'_>,
        writer: &mut W,
        destination: Endpoint<'_>,
        control: &TransferControl,
        mut on_progress: F,
    ) -> Result<u64, SftpError>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
        F: FnMut(u64) + Send,
    {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut transferred = 0u64;

        loop {
            let step = if control.is_cancelled() {
                Err(SftpError::TransferCancelled)
            } else {
                match reader.read(&mut buffer).await {
                    Ok(0) => break,
                    Ok(n) => writer
                        .write_all(&buffer[..n])
                        .await
                        .map(|()| n)
                        .map_err(|e| destination.error(e)),
                    Err(e) => Err(source.error(e)),
                }
            };

            match step {
                Ok(n) => {
                    transferred += n as u64;
                    on_progress(transferred);
                }
                Err(e) => {
                    match &e {
                        SftpError::TransferCancelled => info!("Transfer cancelled at {} bytes", transferred),
                        other => warn!("Transfer stopped at {} bytes: {}", transferred, other),
                    }
                    // Partial destination stays; push what was written so far
                    if let Err(flush_err) = writer.flush().await {
                        debug!("Flush of partial destination failed: {}", flush_err);
                    }
                    return Err(e);
                }
            }
        }

        writer.flush().await.map_err(|e| destination.error(e))?;
        writer.shutdown().await.map_err(|e| destination.error(e))?;

        debug!("Copied {} bytes", transferred);
        Ok(transferred)
    }
}
