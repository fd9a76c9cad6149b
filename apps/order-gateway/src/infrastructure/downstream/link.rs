//! Trading Core TCP Link
//!
//! Maintains one connection to the trading core, carrying newline-delimited
//! JSON: [`CoreOperation`] lines out, [`CoreEvent`] lines in. A single writer
//! task drains the shared command queue, which serializes concurrent sends
//! from every session against interleaved partial writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::model::{CoreEvent, CoreOperation};
use crate::application::ports::{DownstreamError, TradingCore};

use super::backoff::{BackoffConfig, BackoffPolicy};

/// Configuration for the core link.
#[derive(Debug, Clone)]
pub struct CoreLinkConfig {
    /// Core address, `host:port`.
    pub addr: String,
    /// Capacity of the shared command queue.
    pub command_queue: usize,
    /// Reconnection backoff.
    pub backoff: BackoffConfig,
}

/// Submission handle shared by all sessions.
///
/// Cheap to clone; every clone pushes into the same serialized queue.
#[derive(Debug, Clone)]
pub struct CoreLink {
    command_tx: mpsc::Sender<CoreOperation>,
    connected: Arc<AtomicBool>,
}

impl CoreLink {
    /// Whether the link currently holds a connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TradingCore for CoreLink {
    async fn submit(&self, operation: CoreOperation) -> Result<(), DownstreamError> {
        if !self.is_connected() {
            return Err(DownstreamError::Unavailable("link down".to_string()));
        }
        self.command_tx.try_send(operation).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DownstreamError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => {
                DownstreamError::Unavailable("link task stopped".to_string())
            }
        })
    }
}

/// The connection-owning task behind a [`CoreLink`].
pub struct CoreLinkTask {
    config: CoreLinkConfig,
    command_rx: mpsc::Receiver<CoreOperation>,
    event_tx: mpsc::Sender<CoreEvent>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

/// Create a link and its task. Spawn [`CoreLinkTask::run`] to drive it.
#[must_use]
pub fn channel(
    config: CoreLinkConfig,
    event_tx: mpsc::Sender<CoreEvent>,
    cancel: CancellationToken,
) -> (CoreLink, CoreLinkTask) {
    let (command_tx, command_rx) = mpsc::channel(config.command_queue);
    let connected = Arc::new(AtomicBool::new(false));
    let link = CoreLink {
        command_tx,
        connected: Arc::clone(&connected),
    };
    let task = CoreLinkTask {
        config,
        command_rx,
        event_tx,
        connected,
        cancel,
    };
    (link, task)
}

impl CoreLinkTask {
    /// Connect, pump, and reconnect until cancelled.
    pub async fn run(mut self) {
        let mut backoff = BackoffPolicy::new(self.config.backoff.clone());
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match TcpStream::connect(&self.config.addr).await {
                Ok(stream) => {
                    tracing::info!(addr = %self.config.addr, "Trading core connected");
                    backoff.reset();
                    self.connected.store(true, Ordering::SeqCst);
                    self.pump(stream).await;
                    self.connected.store(false, Ordering::SeqCst);
                    tracing::warn!(addr = %self.config.addr, "Trading core disconnected");
                }
                Err(e) => {
                    tracing::warn!(
                        addr = %self.config.addr,
                        error = %e,
                        attempt = backoff.attempt_count() + 1,
                        "Trading core connect failed"
                    );
                }
            }
            if self.cancel.is_cancelled() {
                break;
            }
            let delay = backoff.next_delay();
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
        tracing::debug!("Core link task stopped");
    }

    /// Pump one live connection until it drops or we are cancelled.
    async fn pump(&mut self, stream: TcpStream) {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write_half.shutdown().await;
                    return;
                }
                command = self.command_rx.recv() => {
                    let Some(operation) = command else { return };
                    let Ok(mut line) = serde_json::to_vec(&operation) else {
                        tracing::error!(op_id = %operation.op_id, "Operation failed to serialize");
                        continue;
                    };
                    line.push(b'\n');
                    if let Err(e) = write_half.write_all(&line).await {
                        tracing::warn!(error = %e, "Core write failed");
                        return;
                    }
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(text)) => self.handle_event_line(&text).await,
                        Ok(None) => return,
                        Err(e) => {
                            tracing::warn!(error = %e, "Core read failed");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_event_line(&self, text: &str) {
        match serde_json::from_str::<CoreEvent>(text) {
            Ok(event) => {
                if self.event_tx.send(event).await.is_err() {
                    tracing::debug!("Event channel closed, dropping core event");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable core event line");
            }
        }
    }
}
