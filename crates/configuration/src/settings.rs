use rust_decimal::Decimal;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub stream: StreamConfig,
    pub aggregation: AggregationConfig,
    pub super_trend: SuperTrendParams,
    pub simulation: SimulationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Parameters for the per-symbol market-data connections.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// The WebSocket host, e.g. "wss://fstream.binance.com".
    pub base_url: String,
    /// The kline interval requested from the exchange (e.g., "1m").
    pub interval: String,
    /// Fixed delay before a dropped connection is reopened.
    pub reconnect_delay_ms: u64,
    /// Capacity of the channel between a connection task and its pipeline.
    pub channel_capacity: usize,
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Controls how ticks are windowed into bars.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// Window size in minutes. Bars are only finalized on minutes that are a multiple of this.
    pub time_interval: u32,
}

/// Parameters for the Supertrend indicator.
#[derive(Debug, Deserialize, Clone)]
pub struct SuperTrendParams {
    pub atr_period: usize,
    pub atr_multiplier: Decimal,
}

/// The simulated single-asset account every pipeline starts with.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    pub initial_balance: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG` when set.
    pub level: String,
    /// Directory for the daily rolling log file.
    pub directory: String,
    pub file_prefix: String,
}

impl Config {
    /// Rejects settings that would make the pipeline misbehave at runtime.
    pub fn validate(&self) -> Result<(), String> {
        if self.super_trend.atr_period == 0 {
            return Err("super_trend.atr_period cannot be zero".to_string());
        }
        if self.super_trend.atr_multiplier <= Decimal::ZERO {
            return Err("super_trend.atr_multiplier must be positive".to_string());
        }
        if !(1..=60).contains(&self.aggregation.time_interval) {
            return Err(format!(
                "aggregation.time_interval must be between 1 and 60 minutes, got {}",
                self.aggregation.time_interval
            ));
        }
        if self.stream.reconnect_delay_ms == 0 {
            return Err("stream.reconnect_delay_ms cannot be zero".to_string());
        }
        if self.stream.channel_capacity == 0 {
            return Err("stream.channel_capacity cannot be zero".to_string());
        }
        if self.simulation.initial_balance <= Decimal::ZERO {
            return Err("simulation.initial_balance must be positive".to_string());
        }
        Ok(())
    }
}
