//! Control signals delivered to a running crawl

use crate::CatalogError;
use tokio::sync::{mpsc, oneshot};

/// Acknowledgement sent once durable state has been written
pub type Ack = oneshot::Sender<Result<(), String>>;

/// Signal handled by the worker pool between requests
#[derive(Debug)]
pub enum ControlSignal {
    /// Persist queue and quota state, then keep crawling
    Checkpoint { ack: Ack },

    /// Persist queue and quota state, then stop
    Shutdown { ack: Ack },
}

/// Cloneable handle for checkpointing or stopping a running crawl
#[derive(Debug, Clone)]
pub struct CrawlHandle {
    tx: mpsc::Sender<ControlSignal>,
}

impl CrawlHandle {
    pub(crate) fn new(tx: mpsc::Sender<ControlSignal>) -> Self {
        Self { tx }
    }

    /// Asks the crawl to persist its state and waits until it has
    pub async fn checkpoint(&self) -> crate::Result<()> {
        self.send(|ack| ControlSignal::Checkpoint { ack }).await
    }

    /// Asks the crawl to persist its state and stop, and waits until it has
    pub async fn shutdown(&self) -> crate::Result<()> {
        self.send(|ack| ControlSignal::Shutdown { ack }).await
    }

    async fn send(&self, signal: impl FnOnce(Ack) -> ControlSignal) -> crate::Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(signal(ack))
            .await
            .map_err(|_| CatalogError::ControlClosed)?;

        done.await
            .map_err(|_| CatalogError::ControlClosed)?
            .map_err(CatalogError::Checkpoint)
    }
}
