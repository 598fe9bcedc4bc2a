use crate::error::EventsError;
use core_types::Signal;
use serde::{Deserialize, Serialize};

/// The top-level WebSocket message enum.
/// All communication from the server to the client will be one of these variants.
///
/// Serialized as an adjacently tagged object, e.g.
/// `{"type": "signals", "payload": [{"signal": "Buy", ...}]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WsMessage {
    /// The signals accepted by one pipeline run. May be empty.
    Signals(Vec<Signal>),
    /// A simple message to confirm to a new client that its WebSocket connection is active.
    Connected,
}

impl WsMessage {
    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}
