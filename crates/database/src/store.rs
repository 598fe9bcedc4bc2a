use crate::error::DbError;
use async_trait::async_trait;
use core_types::Signal;
use serde::Serialize;
use tokio::sync::mpsc;

/// What a `save_signals` call did with each signal in the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub inserted: usize,
    /// Signals already present in the collection with the same open time, symbol and price.
    pub skipped: usize,
}

/// The persistence side of a pipeline.
///
/// Writes are idempotent: a signal matching a stored one on
/// `(open_time, symbol, price)` within the same collection is skipped.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn save_signals(
        &self,
        collection_key: &str,
        signals: &[Signal],
    ) -> Result<SaveOutcome, DbError>;
}

/// Where the engine learns which symbols to stream.
#[async_trait]
pub trait WatchSource: Send + Sync {
    /// The symbols that exist at startup.
    async fn list_symbols(&self) -> Result<Vec<String>, DbError>;

    /// A feed of symbols added after startup. The feed ending means no further
    /// additions will be observed.
    async fn subscribe_to_additions(&self) -> Result<mpsc::Receiver<String>, DbError>;
}
