use crate::error::EngineError;
use crate::pipeline::{PipelineSettings, SymbolPipeline};
use api_client::{ConnectionHandle, LiveConnector};
use database::{SignalStore, WatchSource};
use events::SignalBroadcaster;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// The running pieces of one tracked symbol.
#[derive(Debug)]
pub struct PipelineHandle {
    connection: ConnectionHandle,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    fn abort(&self) {
        self.connection.abort();
        self.task.abort();
    }
}

/// Tracks which symbols have a running pipeline and spawns new ones.
///
/// Symbols are keyed in lower case. Pipelines are never torn down while the
/// registry is alive.
#[derive(Clone)]
pub struct WatchRegistry {
    connector: LiveConnector,
    settings: PipelineSettings,
    store: Arc<dyn SignalStore>,
    broadcaster: SignalBroadcaster,
    pipelines: Arc<Mutex<HashMap<String, PipelineHandle>>>,
}

impl WatchRegistry {
    pub fn new(
        connector: LiveConnector,
        settings: PipelineSettings,
        store: Arc<dyn SignalStore>,
        broadcaster: SignalBroadcaster,
    ) -> Self {
        Self {
            connector,
            settings,
            store,
            broadcaster,
            pipelines: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Starts a pipeline for `symbol` unless one is already running.
    /// Returns whether a new pipeline was spawned.
    pub async fn track(&self, symbol: &str) -> Result<bool, EngineError> {
        let key = symbol.trim().to_lowercase();
        if key.is_empty() {
            return Ok(false);
        }

        let mut pipelines = self.pipelines.lock().await;
        if pipelines.contains_key(&key) {
            return Ok(false);
        }

        let pipeline = SymbolPipeline::new(
            &key,
            &self.settings,
            Arc::clone(&self.store),
            self.broadcaster.clone(),
        )?;
        let (connection, events) = self.connector.connect(&key);
        let task = tokio::spawn(pipeline.run(events));

        tracing::info!(symbol = %key, "Pipeline spawned.");
        pipelines.insert(key, PipelineHandle { connection, task });
        Ok(true)
    }

    /// The tracked symbols, sorted.
    pub async fn symbols(&self) -> Vec<String> {
        let pipelines = self.pipelines.lock().await;
        let mut symbols: Vec<String> = pipelines.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Loads the initial symbol set, then follows the addition feed until it ends.
    ///
    /// The feed is subscribed before the initial load so that a symbol added in
    /// between is not missed; `track` ignores the overlap.
    pub async fn watch(&self, source: &dyn WatchSource) -> Result<(), EngineError> {
        let mut additions = source.subscribe_to_additions().await?;

        let initial = source.list_symbols().await?;
        tracing::info!(count = initial.len(), "Loaded watch list.");
        for symbol in &initial {
            self.track(symbol).await?;
        }

        while let Some(symbol) = additions.recv().await {
            match self.track(&symbol).await {
                Ok(true) => tracing::info!(symbol = %symbol, "Started watching new symbol."),
                Ok(false) => tracing::debug!(symbol = %symbol, "Symbol already watched."),
                Err(e) => tracing::error!(symbol = %symbol, error = %e, "Failed to start pipeline."),
            }
        }

        tracing::warn!("Watch symbol feed closed; no further symbols will be added.");
        Ok(())
    }

    /// Aborts every connection and pipeline task.
    pub async fn shutdown(&self) {
        let mut pipelines = self.pipelines.lock().await;
        for (symbol, handle) in pipelines.drain() {
            tracing::debug!(symbol = %symbol, "Stopping pipeline.");
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::{ApiError, FrameStream, KlineTransport};
    use async_trait::async_trait;
    use configuration::{StreamConfig, SuperTrendParams};
    use database::{DbError, InMemorySignalStore};
    use futures_util::stream::{self, StreamExt};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use url::Url;

    /// Connections that open and then stay silent.
    #[derive(Default)]
    struct IdleTransport {
        opened: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl KlineTransport for IdleTransport {
        async fn open(&self, url: &Url) -> Result<FrameStream, ApiError> {
            self.opened.lock().await.push(url.path().to_string());
            Ok(stream::pending().boxed())
        }
    }

    struct FakeSource {
        initial: Vec<String>,
        additions: Mutex<Option<mpsc::Receiver<String>>>,
        subscriptions: AtomicUsize,
    }

    #[async_trait]
    impl WatchSource for FakeSource {
        async fn list_symbols(&self) -> Result<Vec<String>, DbError> {
            Ok(self.initial.clone())
        }

        async fn subscribe_to_additions(&self) -> Result<mpsc::Receiver<String>, DbError> {
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
            self.additions
                .lock()
                .await
                .take()
                .ok_or_else(|| DbError::InvalidRecord("already subscribed".to_string()))
        }
    }

    fn registry(transport: Arc<IdleTransport>) -> WatchRegistry {
        let stream = StreamConfig {
            base_url: "wss://fstream.binance.com".to_string(),
            interval: "1m".to_string(),
            reconnect_delay_ms: 1000,
            channel_capacity: 16,
        };
        let settings = PipelineSettings {
            time_interval: 1,
            super_trend: SuperTrendParams {
                atr_period: 10,
                atr_multiplier: dec!(3),
            },
            initial_balance: dec!(100000),
        };
        WatchRegistry::new(
            LiveConnector::with_transport(&stream, transport).unwrap(),
            settings,
            Arc::new(InMemorySignalStore::new()),
            SignalBroadcaster::new(16),
        )
    }

    #[tokio::test]
    async fn a_symbol_is_tracked_once_regardless_of_case() {
        let registry = registry(Arc::new(IdleTransport::default()));

        assert!(registry.track("BTCUSDT").await.unwrap());
        assert!(!registry.track("btcusdt").await.unwrap());
        assert!(!registry.track("  ").await.unwrap());
        assert_eq!(registry.symbols().await, vec!["btcusdt".to_string()]);

        registry.shutdown().await;
        assert!(registry.symbols().await.is_empty());
    }

    #[tokio::test]
    async fn initial_load_and_additions_spawn_one_connection_each() {
        let transport = Arc::new(IdleTransport::default());
        let registry = registry(Arc::clone(&transport));
        let (tx, rx) = mpsc::channel(8);
        let source = FakeSource {
            initial: vec!["BTCUSDT".to_string(), "ethusdt".to_string()],
            additions: Mutex::new(Some(rx)),
            subscriptions: AtomicUsize::new(0),
        };

        tx.send("btcusdt".to_string()).await.unwrap();
        tx.send("SOLUSDT".to_string()).await.unwrap();
        drop(tx);

        registry.watch(&source).await.unwrap();

        assert_eq!(source.subscriptions.load(Ordering::SeqCst), 1);
        assert_eq!(
            registry.symbols().await,
            vec!["btcusdt".to_string(), "ethusdt".to_string(), "solusdt".to_string()]
        );

        // Let the connection tasks reach `open`.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let mut opened = transport.opened.lock().await.clone();
        opened.sort();
        assert_eq!(
            opened,
            vec![
                "/ws/btcusdt@kline_1m".to_string(),
                "/ws/ethusdt@kline_1m".to_string(),
                "/ws/solusdt@kline_1m".to_string(),
            ]
        );
        registry.shutdown().await;
    }
}
