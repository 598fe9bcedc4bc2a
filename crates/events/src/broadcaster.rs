use crate::messages::WsMessage;
use core_types::Signal;
use tokio::sync::broadcast;

/// Fans pipeline output out to every connected WebSocket client.
///
/// Delivery is fire-and-forget. Sending with no subscribers is not an error, and
/// a subscriber that falls behind by more than the channel capacity loses the
/// oldest messages.
#[derive(Debug, Clone)]
pub struct SignalBroadcaster {
    tx: broadcast::Sender<WsMessage>,
}

impl SignalBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emits one `signals` message and returns how many subscribers it reached.
    pub fn emit_signals(&self, signals: &[Signal]) -> usize {
        match self.tx.send(WsMessage::Signals(signals.to_vec())) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!(count = signals.len(), "No broadcast subscribers.");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
