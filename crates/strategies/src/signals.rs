use chrono::{DateTime, Utc};
use core_types::{Bar, Signal, SignalType};

/// Turns Supertrend flips into Buy/Sell candidates and filters out replays.
///
/// Every call scans the whole trend history. A candidate is accepted only when it
/// differs from the last accepted signal in type or bar open time, and each
/// accepted candidate becomes the new reference.
#[derive(Debug, Default, Clone)]
pub struct SignalGenerator {
    last_signal: Option<Signal>,
}

impl SignalGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_signal(&self) -> Option<&Signal> {
        self.last_signal.as_ref()
    }

    /// Scans `in_uptrend` from index 1 and returns the signals accepted by this call.
    pub fn generate(
        &mut self,
        bars: &[Bar],
        in_uptrend: &[bool],
        signal_time: DateTime<Utc>,
    ) -> Vec<Signal> {
        let len = bars.len().min(in_uptrend.len());
        let mut accepted = Vec::new();

        for i in 1..len {
            let flip = match (in_uptrend[i - 1], in_uptrend[i]) {
                (false, true) => SignalType::Buy,
                (true, false) => SignalType::Sell,
                _ => continue,
            };

            let candidate = Signal::from_flip(flip, &bars[i], signal_time);
            let is_new = self
                .last_signal
                .as_ref()
                .is_none_or(|last| !last.same_event(&candidate));

            if is_new {
                tracing::debug!(
                    symbol = %candidate.symbol,
                    signal = %candidate.signal_type,
                    open_time = %candidate.open_time,
                    price = %candidate.price,
                    "Accepted trend flip signal."
                );
                self.last_signal = Some(candidate.clone());
                accepted.push(candidate);
            }
        }

        accepted
    }
}
