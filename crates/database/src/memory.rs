use crate::error::DbError;
use crate::store::{SaveOutcome, SignalStore};
use async_trait::async_trait;
use core_types::Signal;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// A `SignalStore` held in process memory, keyed by collection.
#[derive(Debug, Default)]
pub struct InMemorySignalStore {
    collections: Mutex<HashMap<String, Vec<Signal>>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything stored under `collection_key`, in insertion order.
    pub async fn signals(&self, collection_key: &str) -> Vec<Signal> {
        let collections = self.collections.lock().await;
        collections.get(collection_key).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn save_signals(
        &self,
        collection_key: &str,
        signals: &[Signal],
    ) -> Result<SaveOutcome, DbError> {
        let mut collections = self.collections.lock().await;
        let stored = collections.entry(collection_key.to_string()).or_default();
        let mut outcome = SaveOutcome::default();

        for signal in signals {
            let exists = stored.iter().any(|s| {
                s.open_time == signal.open_time && s.symbol == signal.symbol && s.price == signal.price
            });
            if exists {
                outcome.skipped += 1;
            } else {
                stored.push(signal.clone());
                outcome.inserted += 1;
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::{Bar, SignalType};
    use rust_decimal_macros::dec;

    fn sell_at(minute: u32) -> Signal {
        let bar = Bar {
            symbol: "BTCUSDT".to_string(),
            open_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100),
        };
        Signal::from_flip(SignalType::Sell, &bar, Utc::now())
    }

    #[tokio::test]
    async fn existing_signal_is_not_inserted_twice() {
        let store = InMemorySignalStore::new();
        let first = sell_at(3);

        let outcome = store.save_signals("BTCUSDT_Signal_Data", &[first.clone()]).await.unwrap();
        assert_eq!(outcome, SaveOutcome { inserted: 1, skipped: 0 });

        // A fresh id does not make it a different record.
        let mut replay = first.clone();
        replay.signal_id = uuid::Uuid::new_v4();
        let outcome = store
            .save_signals("BTCUSDT_Signal_Data", &[replay, sell_at(6)])
            .await
            .unwrap();

        assert_eq!(outcome, SaveOutcome { inserted: 1, skipped: 1 });
        assert_eq!(store.signals("BTCUSDT_Signal_Data").await.len(), 2);
    }

    #[tokio::test]
    async fn collections_are_independent() {
        let store = InMemorySignalStore::new();
        let signal = sell_at(3);

        store.save_signals("BTCUSDT_Signal_Data", &[signal.clone()]).await.unwrap();
        let outcome = store.save_signals("OTHER_Signal_Data", &[signal]).await.unwrap();

        assert_eq!(outcome.inserted, 1);
        assert!(store.signals("ETHUSDT_Signal_Data").await.is_empty());
    }
}
