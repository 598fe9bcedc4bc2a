//! # Trendwatch Database Crate
//!
//! This crate is the persistence side of the signal pipeline: where generated
//! signals are archived and where the set of watched symbols comes from.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 Adapter:** All SQL lives here. The engine only sees the
//!   `SignalStore` and `WatchSource` traits, so it can run against
//!   `InMemorySignalStore` in tests.
//! - **Idempotent Writes:** `signals` carries a unique constraint on
//!   `(collection_key, open_time, symbol, price)`, and inserts use
//!   `ON CONFLICT DO NOTHING`. Replays are counted as skipped, never as errors.
//! - **Change Feed:** New watch symbols are announced through Postgres
//!   `LISTEN/NOTIFY`, raised by a trigger installed by the migrations.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: pool setup and schema migrations.
//! - `DbRepository`: the Postgres implementation of both traits, plus the
//!   read queries used by the CLI and web server.
//! - `InMemorySignalStore`: a process-local `SignalStore`.
//! - `DbError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod memory;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use memory::InMemorySignalStore;
pub use repository::{DbRepository, WatchSymbol};
pub use store::{SaveOutcome, SignalStore, WatchSource};
