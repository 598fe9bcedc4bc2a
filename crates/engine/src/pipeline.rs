use crate::aggregator::BarAggregator;
use crate::error::EngineError;
use api_client::StreamEvent;
use chrono::{DateTime, Utc};
use configuration::{Config, SuperTrendParams};
use core_types::{signal_collection_key, Bar, RawTick, Signal};
use database::SignalStore;
use events::SignalBroadcaster;
use executor::{Persist, Portfolio};
use rust_decimal::Decimal;
use std::sync::Arc;
use strategies::{SignalGenerator, SuperTrend};
use tokio::sync::mpsc;

/// The per-symbol slice of the configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub time_interval: u32,
    pub super_trend: SuperTrendParams,
    pub initial_balance: Decimal,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            time_interval: config.aggregation.time_interval,
            super_trend: config.super_trend.clone(),
            initial_balance: config.simulation.initial_balance,
        }
    }
}

/// One symbol's actor: aggregation, indicator, signals and the simulated position.
///
/// It is driven by the `StreamEvent`s of a single connection and shares no mutable
/// state with other pipelines. Connection drops do not touch any of its state.
pub struct SymbolPipeline {
    symbol: String,
    collection_key: String,
    aggregator: BarAggregator,
    super_trend: SuperTrend,
    generator: SignalGenerator,
    portfolio: Portfolio,
    store: Arc<dyn SignalStore>,
    broadcaster: SignalBroadcaster,
}

impl SymbolPipeline {
    pub fn new(
        symbol: &str,
        settings: &PipelineSettings,
        store: Arc<dyn SignalStore>,
        broadcaster: SignalBroadcaster,
    ) -> Result<Self, EngineError> {
        let symbol = symbol.to_uppercase();
        Ok(Self {
            collection_key: signal_collection_key(&symbol),
            symbol,
            aggregator: BarAggregator::new(settings.time_interval),
            super_trend: SuperTrend::new(&settings.super_trend)?,
            generator: SignalGenerator::new(),
            portfolio: Portfolio::new(settings.initial_balance),
            store,
            broadcaster,
        })
    }

    /// Consumes connection events until the connection task goes away.
    pub async fn run(mut self, mut events: mpsc::Receiver<StreamEvent>) {
        while let Some(event) = events.recv().await {
            self.on_event(event, Utc::now()).await;
        }
        tracing::info!(symbol = %self.symbol, "Pipeline stopped.");
    }

    /// Handles one connection event. Returns the accepted signals when a bar was finalized.
    pub async fn on_event(&mut self, event: StreamEvent, now: DateTime<Utc>) -> Option<Vec<Signal>> {
        match event {
            StreamEvent::Connected => {
                tracing::info!(symbol = %self.symbol, "Pipeline stream ready.");
                None
            }
            StreamEvent::Disconnected => {
                tracing::debug!(
                    symbol = %self.symbol,
                    bars = self.aggregator.bars().len(),
                    "Stream dropped; keeping pipeline state."
                );
                None
            }
            StreamEvent::Tick(tick) => self.on_tick_at(tick, now).await,
        }
    }

    /// Feeds a tick through the aggregator and, when it closes a bar, through the
    /// indicator, the signal generator and the position simulator.
    ///
    /// The accepted signals are broadcast even when empty. Persistence failures are
    /// logged and do not roll back the in-memory state, but an unsaved pair is not
    /// counted.
    pub async fn on_tick_at(&mut self, tick: RawTick, now: DateTime<Utc>) -> Option<Vec<Signal>> {
        self.aggregator.on_tick(tick, now)?;

        let series = match self.super_trend.compute(self.aggregator.bars()) {
            Ok(series) => series,
            Err(e) => {
                tracing::error!(symbol = %self.symbol, error = %e, "Supertrend computation failed.");
                return None;
            }
        };

        let mut accepted = self
            .generator
            .generate(self.aggregator.bars(), &series.in_uptrend, now);

        match self.portfolio.apply_signals(&mut accepted) {
            Ok(Persist::Skip) => {}
            Ok(decision) => {
                if self.persist(&accepted).await && decision == Persist::Pair {
                    self.portfolio.record_saved_pair();
                }
            }
            Err(e) => tracing::error!(symbol = %self.symbol, error = %e, "Failed to price signals."),
        }

        self.broadcaster.emit_signals(&accepted);
        Some(accepted)
    }

    /// Returns whether the store took the batch.
    async fn persist(&self, signals: &[Signal]) -> bool {
        match self.store.save_signals(&self.collection_key, signals).await {
            Ok(outcome) => {
                tracing::info!(
                    symbol = %self.symbol,
                    collection = %self.collection_key,
                    inserted = outcome.inserted,
                    skipped = outcome.skipped,
                    "Signals saved."
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    symbol = %self.symbol,
                    collection = %self.collection_key,
                    error = %e,
                    "Failed to save signals."
                );
                false
            }
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn collection_key(&self) -> &str {
        &self.collection_key
    }

    pub fn bars(&self) -> &[Bar] {
        self.aggregator.bars()
    }

    pub fn aggregator(&self) -> &BarAggregator {
        &self.aggregator
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn last_signal(&self) -> Option<&Signal> {
        self.generator.last_signal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use database::InMemorySignalStore;
    use rust_decimal_macros::dec;

    fn settings() -> PipelineSettings {
        PipelineSettings {
            time_interval: 1,
            super_trend: SuperTrendParams {
                atr_period: 1,
                atr_multiplier: dec!(3),
            },
            initial_balance: dec!(100000),
        }
    }

    fn tick(minute: u32, close: Decimal) -> RawTick {
        RawTick {
            symbol: "BTCUSDT".to_string(),
            event_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            open: close,
            high: close + dec!(0.5),
            low: close - dec!(0.5),
            close,
        }
    }

    #[test]
    fn collection_key_is_upper_cased() {
        let pipeline = SymbolPipeline::new(
            "btcusdt",
            &settings(),
            Arc::new(InMemorySignalStore::new()),
            SignalBroadcaster::new(4),
        )
        .unwrap();
        assert_eq!(pipeline.symbol(), "BTCUSDT");
        assert_eq!(pipeline.collection_key(), "BTCUSDT_Signal_Data");
    }

    #[test]
    fn zero_atr_period_is_rejected() {
        let mut bad = settings();
        bad.super_trend.atr_period = 0;
        let result = SymbolPipeline::new(
            "btcusdt",
            &bad,
            Arc::new(InMemorySignalStore::new()),
            SignalBroadcaster::new(4),
        );
        assert!(matches!(result, Err(EngineError::Strategy(_))));
    }

    #[tokio::test]
    async fn every_finalized_bar_is_broadcast() {
        let broadcaster = SignalBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        let mut pipeline = SymbolPipeline::new(
            "btcusdt",
            &settings(),
            Arc::new(InMemorySignalStore::new()),
            broadcaster,
        )
        .unwrap();

        let first = tick(1, dec!(10));
        let now = first.event_time;
        assert!(pipeline.on_tick_at(first, now).await.is_none());

        let second = tick(2, dec!(10));
        let now = second.event_time;
        assert_eq!(pipeline.on_tick_at(second, now).await, Some(vec![]));
        assert_eq!(rx.recv().await.unwrap(), events::WsMessage::Signals(vec![]));
    }

    #[tokio::test]
    async fn disconnect_leaves_state_untouched() {
        let mut pipeline = SymbolPipeline::new(
            "btcusdt",
            &settings(),
            Arc::new(InMemorySignalStore::new()),
            SignalBroadcaster::new(4),
        )
        .unwrap();
        for minute in 1..=3 {
            let t = tick(minute, dec!(10));
            let now = t.event_time;
            pipeline.on_tick_at(t, now).await;
        }
        let bars_before = pipeline.bars().to_vec();
        let portfolio_before = pipeline.portfolio().clone();

        assert!(pipeline.on_event(StreamEvent::Disconnected, Utc::now()).await.is_none());
        assert!(pipeline.on_event(StreamEvent::Connected, Utc::now()).await.is_none());

        assert_eq!(pipeline.bars(), bars_before.as_slice());
        assert_eq!(pipeline.portfolio(), &portfolio_before);
        assert_eq!(pipeline.aggregator().last_window_minute(), 3);
    }
}
