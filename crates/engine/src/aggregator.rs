use chrono::{DateTime, Timelike, Utc};
use core_types::{Bar, RawTick};

/// Turns a symbol's tick stream into at most one bar per aligned window.
///
/// Minutes are minute-of-hour in UTC. A tick only triggers finalization when its
/// minute differs from the last one seen and is not minute 0. Finalization happens
/// on wall-clock minutes that are a multiple of `time_interval`, at most once per
/// minute, and takes the latest buffered tick of the previous `time_interval`
/// minutes as the bar.
#[derive(Debug, Clone)]
pub struct BarAggregator {
    time_interval: u32,
    raw_buffer: Vec<RawTick>,
    bars: Vec<Bar>,
    last_window_minute: u32,
    last_aggregated_minute: Option<u32>,
}

impl BarAggregator {
    pub fn new(time_interval: u32) -> Self {
        Self {
            // A zero window would make every minute "aligned" with an empty range.
            time_interval: time_interval.max(1),
            raw_buffer: Vec::new(),
            bars: Vec::new(),
            last_window_minute: 0,
            last_aggregated_minute: None,
        }
    }

    /// Buffers `tick` and returns the bar it finalized, if any. `now` is the wall clock.
    pub fn on_tick(&mut self, tick: RawTick, now: DateTime<Utc>) -> Option<&Bar> {
        let tick_minute = tick.event_time.minute();
        self.raw_buffer.push(tick);

        if tick_minute == self.last_window_minute || tick_minute == 0 {
            return None;
        }
        self.last_window_minute = tick_minute;
        self.finalize(now.minute())
    }

    fn finalize(&mut self, current_minute: u32) -> Option<&Bar> {
        if current_minute % self.time_interval != 0 || self.last_aggregated_minute == Some(current_minute) {
            return None;
        }

        let window_start = i64::from(current_minute) - i64::from(self.time_interval);
        let window_end = i64::from(current_minute);
        let latest = self.raw_buffer.iter().rev().find(|t| {
            let m = i64::from(t.event_time.minute());
            m >= window_start && m < window_end
        })?;

        let bar = Bar::from(latest);
        // Everything up to the finalized kline is spent.
        let cutoff = bar.open_time;
        self.raw_buffer.retain(|t| t.event_time > cutoff);

        tracing::debug!(
            symbol = %bar.symbol,
            open_time = %bar.open_time,
            close = %bar.close,
            "Bar finalized."
        );
        self.last_aggregated_minute = Some(current_minute);
        self.bars.push(bar);
        self.bars.last()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn buffered_ticks(&self) -> usize {
        self.raw_buffer.len()
    }

    pub fn last_window_minute(&self) -> u32 {
        self.last_window_minute
    }

    pub fn last_aggregated_minute(&self) -> Option<u32> {
        self.last_aggregated_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, second).unwrap()
    }

    fn tick(minute: u32, close: i64) -> RawTick {
        let close = Decimal::from(close);
        RawTick {
            symbol: "BTCUSDT".to_string(),
            event_time: at(12, minute, 0),
            open: close,
            high: close,
            low: close,
            close,
        }
    }

    #[test]
    fn latest_tick_of_the_previous_minute_becomes_the_bar() {
        let mut agg = BarAggregator::new(1);
        assert!(agg.on_tick(tick(1, 10), at(12, 1, 5)).is_none());
        assert!(agg.on_tick(tick(1, 11), at(12, 1, 30)).is_none());

        let bar = agg.on_tick(tick(2, 12), at(12, 2, 1)).cloned().unwrap();
        assert_eq!(bar.open_time, at(12, 1, 0));
        assert_eq!(bar.close, Decimal::from(11));
        assert_eq!(agg.bars().len(), 1);
        assert_eq!(agg.last_aggregated_minute(), Some(2));
        // Only the tick of the open minute is still buffered.
        assert_eq!(agg.buffered_ticks(), 1);
    }

    #[test]
    fn at_most_one_bar_per_wall_clock_minute() {
        let mut agg = BarAggregator::new(1);
        agg.on_tick(tick(1, 10), at(12, 1, 0));
        agg.on_tick(tick(2, 11), at(12, 3, 0));

        // A late tick from an earlier minute arrives while the clock still reads 12:03.
        assert!(agg.on_tick(tick(1, 12), at(12, 3, 10)).is_none());
        assert_eq!(agg.bars().len(), 1);
    }

    #[test]
    fn bars_only_on_aligned_minutes() {
        let mut agg = BarAggregator::new(5);
        for minute in 1..=4 {
            assert!(agg.on_tick(tick(minute, minute as i64), at(12, minute, 0)).is_none());
        }
        let bar = agg.on_tick(tick(5, 5), at(12, 5, 0)).cloned().unwrap();
        assert_eq!(bar.open_time, at(12, 4, 0));
        assert_eq!(bar.close, Decimal::from(4));

        for minute in 6..=9 {
            assert!(agg.on_tick(tick(minute, minute as i64), at(12, minute, 0)).is_none());
        }
        assert_eq!(agg.bars().len(), 1);
    }

    #[test]
    fn minute_zero_ticks_never_trigger_finalization() {
        let mut agg = BarAggregator::new(1);
        agg.on_tick(tick(59, 10), at(12, 59, 0));

        let top_of_hour = RawTick {
            event_time: at(13, 0, 0),
            ..tick(0, 11)
        };
        assert!(agg.on_tick(top_of_hour, at(13, 0, 0)).is_none());
        assert_eq!(agg.last_window_minute(), 59);
        assert_eq!(agg.buffered_ticks(), 2);
    }

    #[test]
    fn empty_window_leaves_guards_untouched() {
        let mut agg = BarAggregator::new(1);
        assert!(agg.on_tick(tick(7, 10), at(12, 7, 0)).is_none());
        assert_eq!(agg.last_window_minute(), 7);
        assert_eq!(agg.last_aggregated_minute(), None);

        // The next minute still finalizes the bar for minute 7.
        assert!(agg.on_tick(tick(8, 11), at(12, 8, 0)).is_some());
    }
}
