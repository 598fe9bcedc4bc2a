use crate::enums::SignalType;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single kline update as reported by the live stream for the in-progress bar.
///
/// Ticks are ephemeral: a later tick within the same window supersedes an earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTick {
    pub symbol: String,
    /// The open time of the kline this update belongs to (`k.t` on the wire).
    pub event_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

/// A finalized OHLC bar for one aligned aggregation window. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl From<&RawTick> for Bar {
    fn from(tick: &RawTick) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            open_time: tick.event_time,
            open: tick.open,
            high: tick.high,
            low: tick.low,
            close: tick.close,
        }
    }
}

/// A Buy or Sell event derived from a Supertrend flip.
///
/// The pricing fields stay `None` until the position simulator fills them in, and
/// they are skipped on the wire while empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: Uuid,
    #[serde(rename = "signal")]
    pub signal_type: SignalType,
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub signal_time: DateTime<Utc>,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_balance: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coin: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_or_loss: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_profit_loss: Option<Decimal>,
}

impl Signal {
    /// Builds an unpriced signal for a trend flip on `bar`.
    /// Buys are quoted at the bar's low, sells at the bar's high.
    pub fn from_flip(signal_type: SignalType, bar: &Bar, signal_time: DateTime<Utc>) -> Self {
        let price = match signal_type {
            SignalType::Buy => bar.low,
            SignalType::Sell => bar.high,
        };
        Self {
            signal_id: Uuid::new_v4(),
            signal_type,
            symbol: bar.symbol.clone(),
            open_time: bar.open_time,
            signal_time,
            price,
            remaining_balance: None,
            coin: None,
            profit_or_loss: None,
            total_profit_loss: None,
        }
    }

    /// Two signals describe the same event when they share type and bar open time.
    pub fn same_event(&self, other: &Signal) -> bool {
        self.signal_type == other.signal_type && self.open_time == other.open_time
    }
}

/// The storage partition for a symbol's signal history, e.g. `BTCUSDT_Signal_Data`.
pub fn signal_collection_key(symbol: &str) -> String {
    format!("{}_Signal_Data", symbol.to_uppercase())
}
