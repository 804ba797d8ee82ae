//! Dedicated writer task for command lines.
//!
//! The session task never awaits socket writes: the dispatch queue hands
//! lines to a [`WriterHandle`] which pushes them into an unbounded mpsc
//! channel, and a separate task drains the channel into the socket. The
//! channel has no capacity limit, so a transmitted command is never lost
//! while the writer is alive. Write failures are reported back on an error
//! channel so the session can surface them.
//!
//! # Architecture
//!
//! ```text
//! DispatchQueue ─► WriterHandle ─► mpsc::UnboundedSender<Bytes> ─► Writer Task ─► Socket
//!                                                                   │
//! Session ◄─────────────────────── mpsc::UnboundedSender<ControlError> ◄┘
//! ```

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ControlError;
use crate::protocol::Command;
use crate::queue::Transmit;

/// Default maximum lines coalesced into a single write.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 16;

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum lines coalesced into a single write.
    pub max_batch_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

/// Handle for queueing lines to the writer task.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl WriterHandle {
    /// Queue a raw, already terminated line without waiting.
    ///
    /// Returns `false` only if the writer task has stopped.
    pub fn send_line(&self, line: Bytes) -> bool {
        if self.tx.send(line).is_err() {
            tracing::debug!("Writer closed, line not sent");
            return false;
        }
        true
    }

    /// Check if the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Transmit for WriterHandle {
    fn transmit(&mut self, command: &Command) {
        if self.send_line(command.to_line()) {
            tracing::debug!("-> {}", command);
        }
    }
}

/// Spawn the writer task and return a handle for sending lines.
///
/// # Arguments
///
/// * `writer` - The async writer (socket write half)
/// * `config` - Writer configuration
/// * `errors` - Where write failures are reported
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    errors: mpsc::UnboundedSender<ControlError>,
) -> (WriterHandle, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(writer_loop(rx, writer, config.max_batch_size.max(1), errors));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives lines and writes them to the socket.
///
/// A failed write is reported and the loop keeps going: the command stays
/// in flight and the retry tick sends it again.
async fn writer_loop<W>(
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    mut writer: W,
    max_batch_size: usize,
    errors: mpsc::UnboundedSender<ControlError>,
) where
    W: AsyncWrite + Unpin,
{
    let mut batch = BytesMut::new();

    while let Some(first) = rx.recv().await {
        batch.extend_from_slice(&first);

        // Collect additional ready lines (non-blocking)
        for _ in 1..max_batch_size {
            match rx.try_recv() {
                Ok(line) => batch.extend_from_slice(&line),
                Err(_) => break,
            }
        }

        let result = async {
            writer.write_all(&batch).await?;
            writer.flush().await
        }
        .await;
        batch.clear();

        if let Err(e) = result {
            tracing::debug!("Write failed: {}", e);
            if errors.send(ControlError::Write(e)).is_err() {
                return;
            }
        }
    }
}
