//! Mock trading core for tests.
//!
//! Records every submitted operation and lets a test inject asynchronous
//! core events, without a socket in sight.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::application::model::{CoreEvent, CoreOperation};
use crate::application::ports::{DownstreamError, TradingCore};

/// In-process core double.
#[derive(Debug, Clone)]
pub struct MockCore {
    operations: Arc<Mutex<Vec<CoreOperation>>>,
    event_tx: mpsc::Sender<CoreEvent>,
    available: Arc<Mutex<bool>>,
}

impl MockCore {
    /// Create a mock and the event receiver the dispatcher would consume.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<CoreEvent>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        (
            Self {
                operations: Arc::new(Mutex::new(Vec::new())),
                event_tx,
                available: Arc::new(Mutex::new(true)),
            },
            event_rx,
        )
    }

    /// Every operation submitted so far.
    #[must_use]
    pub fn operations(&self) -> Vec<CoreOperation> {
        self.operations.lock().clone()
    }

    /// Simulate a core outage (submissions fail) or recovery.
    pub fn set_available(&self, available: bool) {
        *self.available.lock() = available;
    }

    /// Inject an asynchronous core event.
    ///
    /// # Panics
    ///
    /// Panics when the event receiver has been dropped; tests keep it alive.
    pub async fn emit(&self, event: CoreEvent) {
        self.event_tx
            .send(event)
            .await
            .unwrap_or_else(|_| panic!("event receiver dropped"));
    }
}

#[async_trait]
impl TradingCore for MockCore {
    async fn submit(&self, operation: CoreOperation) -> Result<(), DownstreamError> {
        if !*self.available.lock() {
            return Err(DownstreamError::Unavailable("mock outage".to_string()));
        }
        self.operations.lock().push(operation);
        Ok(())
    }
}
