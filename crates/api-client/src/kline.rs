use crate::error::ApiError;
use chrono::{TimeZone, Utc};
use core_types::RawTick;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

// --- WebSocket Deserialization Structs ---

/// A `<symbol>@kline_<interval>` event. Only the fields the pipeline uses are decoded.
#[derive(Debug, Deserialize)]
struct WsKlineEvent {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: WsKline,
}

#[derive(Debug, Deserialize)]
struct WsKline {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
}

/// Decodes a kline-shaped text frame into a `RawTick`.
///
/// Both open and closed klines are accepted; the aggregator keeps whichever update
/// arrived last in a window.
pub fn parse_kline_tick(text: &str) -> Result<RawTick, ApiError> {
    let event: WsKlineEvent =
        serde_json::from_str(text).map_err(|e| ApiError::InvalidData(e.to_string()))?;
    let k = event.kline;

    let event_time = Utc
        .timestamp_millis_opt(k.open_time)
        .single()
        .ok_or_else(|| ApiError::InvalidData(format!("Invalid open_time: {}", k.open_time)))?;

    Ok(RawTick {
        symbol: event.symbol,
        event_time,
        open: parse_price(&k.open)?,
        high: parse_price(&k.high)?,
        low: parse_price(&k.low)?,
        close: parse_price(&k.close)?,
    })
}

fn parse_price(raw: &str) -> Result<Decimal, ApiError> {
    Decimal::from_str(raw).map_err(|e| ApiError::InvalidData(format!("{}: {:?}", e, raw)))
}
