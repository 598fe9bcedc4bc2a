use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The direction of a trading signal derived from a Supertrend flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Buy,
    Sell,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "Buy",
            SignalType::Sell => "Sell",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(SignalType::Buy),
            "sell" => Ok(SignalType::Sell),
            other => Err(CoreError::InvalidInput(
                "signal_type".to_string(),
                other.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_signal_types_case_insensitively() {
        assert_eq!("Buy".parse::<SignalType>().unwrap(), SignalType::Buy);
        assert_eq!("SELL".parse::<SignalType>().unwrap(), SignalType::Sell);
        assert!("hold".parse::<SignalType>().is_err());
    }
}
