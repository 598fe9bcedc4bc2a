use core_types::Bar;
use rust_decimal::prelude::*;
use ta::indicators::SimpleMovingAverage;
use ta::Next as _;

use crate::error::StrategyError;
use configuration::SuperTrendParams;

/// The Supertrend indicator, recomputed from scratch over a whole bar history.
///
/// The engine is stateless: the same bars always produce the same [`TrendSeries`].
#[derive(Debug, Clone)]
pub struct SuperTrend {
    atr_period: usize,
    atr_multiplier: f64,
}

/// Per-bar output of a Supertrend run. All vectors have the same length as the input.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSeries {
    pub in_uptrend: Vec<bool>,
    pub upper_band: Vec<f64>,
    pub lower_band: Vec<f64>,
    /// The trailing band: the lower band in an uptrend, the upper band otherwise.
    pub supertrend: Vec<f64>,
}

/// High, low and close of a bar, converted for the `ta` crate.
struct Hlc {
    high: f64,
    low: f64,
    close: f64,
}

impl SuperTrend {
    /// Creates a new `SuperTrend` instance.
    pub fn new(params: &SuperTrendParams) -> Result<Self, StrategyError> {
        if params.atr_period == 0 {
            return Err(StrategyError::InvalidParameters(
                "ATR period cannot be zero".to_string(),
            ));
        }
        let atr_multiplier = params.atr_multiplier.to_f64().ok_or_else(|| {
            StrategyError::InvalidParameters(format!(
                "ATR multiplier {} is not representable as f64",
                params.atr_multiplier
            ))
        })?;

        Ok(Self {
            atr_period: params.atr_period,
            atr_multiplier,
        })
    }

    /// Computes trend flags and bands for every bar in `bars`.
    pub fn compute(&self, bars: &[Bar]) -> Result<TrendSeries, StrategyError> {
        let data = bars.iter().map(to_hlc).collect::<Result<Vec<_>, _>>()?;
        let atr = self.average_true_range(&data)?;

        let mut upper_band = Vec::with_capacity(data.len());
        let mut lower_band = Vec::with_capacity(data.len());
        let mut in_uptrend = vec![true; data.len()];

        for (i, bar) in data.iter().enumerate() {
            let middle = (bar.high + bar.low) / 2.0;
            upper_band.push(middle + self.atr_multiplier * atr[i]);
            lower_band.push(middle - self.atr_multiplier * atr[i]);

            if i == 0 {
                continue;
            }

            if bar.close > upper_band[i - 1] {
                in_uptrend[i] = true;
            } else if bar.close < lower_band[i - 1] {
                in_uptrend[i] = false;
            } else {
                // No breakout: keep the trend and ratchet the active band towards price.
                in_uptrend[i] = in_uptrend[i - 1];
                if in_uptrend[i] {
                    lower_band[i] = lower_band[i].max(lower_band[i - 1]);
                } else {
                    upper_band[i] = upper_band[i].min(upper_band[i - 1]);
                }
            }
        }

        let supertrend = in_uptrend
            .iter()
            .enumerate()
            .map(|(i, up)| if *up { lower_band[i] } else { upper_band[i] })
            .collect();

        Ok(TrendSeries {
            in_uptrend,
            upper_band,
            lower_band,
            supertrend,
        })
    }

    /// Simple (unsmoothed) moving average of the true range.
    /// Indices before the first full window are reported as zero.
    fn average_true_range(&self, data: &[Hlc]) -> Result<Vec<f64>, StrategyError> {
        let mut sma = SimpleMovingAverage::new(self.atr_period).map_err(|e| {
            StrategyError::IndicatorError(format!("Failed to initialize ATR: {:?}", e))
        })?;

        let atr = data
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                let tr = if i == 0 {
                    0.0
                } else {
                    let prev_close = data[i - 1].close;
                    (bar.high - bar.low)
                        .max((bar.high - prev_close).abs())
                        .max((bar.low - prev_close).abs())
                };
                let avg = sma.next(tr);
                if i + 1 < self.atr_period { 0.0 } else { avg }
            })
            .collect();

        Ok(atr)
    }
}

fn to_hlc(bar: &Bar) -> Result<Hlc, StrategyError> {
    // Convert Decimals to f64 for the `ta` crate.
    let convert = |value: Decimal, field: &str| {
        value.to_f64().ok_or_else(|| {
            StrategyError::IndicatorError(format!("Failed to convert {} to f64", field))
        })
    };
    Ok(Hlc {
        high: convert(bar.high, "high")?,
        low: convert(bar.low, "low")?,
        close: convert(bar.close, "close")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn params(atr_period: usize, atr_multiplier: Decimal) -> SuperTrendParams {
        SuperTrendParams {
            atr_period,
            atr_multiplier,
        }
    }

    /// Bars with a one-unit high/low range around each close.
    fn bars(closes: &[i64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let close = Decimal::from(*c);
                Bar {
                    symbol: "BTCUSDT".to_string(),
                    open_time: start + Duration::minutes(i as i64),
                    open: close,
                    high: close + dec!(0.5),
                    low: close - dec!(0.5),
                    close,
                }
            })
            .collect()
    }

    #[test]
    fn rejects_zero_period() {
        assert!(matches!(
            SuperTrend::new(&params(0, dec!(3))),
            Err(StrategyError::InvalidParameters(_))
        ));
    }

    #[test]
    fn empty_history_yields_empty_series() {
        let series = SuperTrend::new(&params(10, dec!(3))).unwrap().compute(&[]).unwrap();
        assert!(series.in_uptrend.is_empty());
        assert!(series.supertrend.is_empty());
    }

    #[test]
    fn breakouts_flip_trend_in_both_directions() {
        let st = SuperTrend::new(&params(1, dec!(3))).unwrap();
        let series = st.compute(&bars(&[10, 10, 4, 4, 16, 16, 4])).unwrap();

        assert_eq!(
            series.in_uptrend,
            vec![true, true, false, false, true, true, false]
        );
        // Bar 4 closes at 16, above the previous upper band of 7.
        assert_eq!(series.upper_band[3], 7.0);
        assert_eq!(series.supertrend[4], series.lower_band[4]);
    }

    #[test]
    fn close_below_prior_lower_band_turns_trend_down() {
        let st = SuperTrend::new(&params(1, dec!(3))).unwrap();
        let series = st.compute(&bars(&[10, 10, 10, 16, 16, 4, 4])).unwrap();

        assert_eq!(
            series.in_uptrend,
            vec![true, true, true, true, true, false, false]
        );
    }

    #[test]
    fn lower_band_ratchets_up_while_trend_holds() {
        let st = SuperTrend::new(&params(1, dec!(3))).unwrap();
        let series = st.compute(&bars(&[10, 10, 10])).unwrap();

        // Raw lower band at index 1 would be 10 - 3 * 1 = 7; it is held at the prior 10.
        assert_eq!(series.lower_band[1], 10.0);
        assert_eq!(series.lower_band[2], 10.0);
        assert!(series.in_uptrend.iter().all(|up| *up));
    }

    #[test]
    fn atr_is_zero_until_the_first_full_window() {
        let st = SuperTrend::new(&params(3, dec!(3))).unwrap();
        let series = st.compute(&bars(&[10, 11, 12, 13])).unwrap();

        // With a zero ATR both bands collapse onto the bar midpoint.
        assert_eq!(series.upper_band[0], 10.0);
        assert_eq!(series.lower_band[0], 10.0);
        assert_eq!(series.upper_band[1], 11.0);
        // Index 2 averages TR = [0, 1.5, 1.5] -> 1.0.
        assert_eq!(series.upper_band[2], 12.0 + 3.0);
    }

    #[test]
    fn recomputation_is_deterministic() {
        let st = SuperTrend::new(&params(2, dec!(1.5))).unwrap();
        let history = bars(&[10, 12, 9, 14, 13, 7, 8, 15]);
        assert_eq!(st.compute(&history).unwrap(), st.compute(&history).unwrap());
    }
}
