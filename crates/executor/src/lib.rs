//! # Trendwatch Executor Crate
//!
//! This crate simulates the single-asset account each symbol pipeline trades with.
//! No orders reach an exchange: a `Portfolio` only prices the signals it is given
//! and keeps the resulting balance, coin holdings and realized profit/loss.
//!
//! ## Public API
//!
//! - `Portfolio`: the in-memory state machine for one symbol's simulated account.
//! - `Persist`: whether a priced batch goes to the store, and how it is counted.
//! - `ExecutorError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod error;
pub mod portfolio;

// Re-export the key components to provide a clean, public-facing API.
pub use error::ExecutorError;
pub use portfolio::{Persist, Portfolio};
