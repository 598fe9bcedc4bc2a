//! # Trendwatch Strategy Library
//!
//! This crate contains the pure trading logic of the signal pipeline: the
//! Supertrend indicator and the flip detector that turns its output into
//! Buy/Sell signals.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of databases,
//!   streams, or broadcasting. It depends only on `core-types` and `configuration`.
//! - **Recompute, don't mutate:** `SuperTrend::compute` takes the whole bar history and
//!   returns a fresh `TrendSeries`, so identical input always gives identical output.
//!   The only state lives in `SignalGenerator`, which remembers the last accepted signal.
//!
//! ## Public API
//!
//! - `SuperTrend` / `TrendSeries`: the indicator and its per-bar output.
//! - `SignalGenerator`: flip detection with last-signal deduplication.
//! - `StrategyError`: the specific error types that can be returned from this crate.

// Declare all the modules that constitute this crate.
pub mod error;
pub mod signals;
pub mod super_trend;

// Re-export the key components to create a clean, public-facing API.
pub use error::StrategyError;
pub use signals::SignalGenerator;
pub use super_trend::{SuperTrend, TrendSeries};
