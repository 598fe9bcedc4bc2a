//! # Trendwatch Events
//!
//! This crate defines the real-time messages pushed to WebSocket clients and the
//! broadcast channel that carries them from the pipelines to the web server.
//!
//! As a Layer 0 crate, it depends only on `core-types`.

// Declare the modules that make up this crate.
pub mod broadcaster;
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use broadcaster::SignalBroadcaster;
pub use error::EventsError;
pub use messages::WsMessage;
