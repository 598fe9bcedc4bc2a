//! Exchange connectivity for the signal pipeline.
//!
//! `LiveConnector` owns one reconnecting WebSocket task per symbol and hands its
//! pipeline a channel of `StreamEvent`s. The socket itself sits behind the
//! `KlineTransport` trait so the reconnect loop can be driven without a network.

pub mod error;
pub mod kline;
pub mod live_connector;

// --- Public API ---
pub use error::ApiError;
pub use kline::parse_kline_tick;
pub use live_connector::{
    ConnectionHandle, FrameStream, KlineTransport, LiveConnector, StreamEvent, WsTransport,
};
