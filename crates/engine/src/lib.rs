//! # Trendwatch Engine
//!
//! The live side of the system. For every watched symbol the engine runs one
//! actor that owns its whole state:
//!
//! ```text
//! LiveConnector ──StreamEvent──▶ SymbolPipeline
//!                                  ├─ BarAggregator   (ticks → bars)
//!                                  ├─ SuperTrend      (bars → trend flags)
//!                                  ├─ SignalGenerator (flips → signals)
//!                                  └─ Portfolio       (signals → balance / P&L)
//!                                        │
//!                         SignalStore ◀──┴──▶ SignalBroadcaster
//! ```
//!
//! `WatchRegistry` spawns the actors, and `LiveEngine` ties the registry to its
//! watch source.

pub mod aggregator;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use aggregator::BarAggregator;
pub use error::EngineError;
pub use pipeline::{PipelineSettings, SymbolPipeline};
pub use registry::{PipelineHandle, WatchRegistry};

use api_client::LiveConnector;
use configuration::Config;
use database::{SignalStore, WatchSource};
use events::SignalBroadcaster;
use std::sync::Arc;

/// The central supervisor for the live signal pipelines.
pub struct LiveEngine {
    registry: WatchRegistry,
    source: Arc<dyn WatchSource>,
}

impl LiveEngine {
    /// Builds an engine that streams from the configured exchange endpoint.
    pub fn new(
        config: &Config,
        source: Arc<dyn WatchSource>,
        store: Arc<dyn SignalStore>,
        broadcaster: SignalBroadcaster,
    ) -> Result<Self, EngineError> {
        let connector = LiveConnector::new(&config.stream)?;
        Ok(Self::with_connector(
            connector,
            PipelineSettings::from(config),
            source,
            store,
            broadcaster,
        ))
    }

    pub fn with_connector(
        connector: LiveConnector,
        settings: PipelineSettings,
        source: Arc<dyn WatchSource>,
        store: Arc<dyn SignalStore>,
        broadcaster: SignalBroadcaster,
    ) -> Self {
        Self {
            registry: WatchRegistry::new(connector, settings, store, broadcaster),
            source,
        }
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Starts a pipeline for every watched symbol and keeps following additions.
    ///
    /// Fails only if the watch source cannot be read at startup. Returns `Ok` once
    /// the addition feed closes; the pipelines already running keep going.
    pub async fn run(&self) -> Result<(), EngineError> {
        tracing::info!("Starting live engine.");
        self.registry.watch(self.source.as_ref()).await
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        tracing::info!("Live engine stopped.");
    }
}
