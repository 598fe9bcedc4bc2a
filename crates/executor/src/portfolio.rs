use crate::error::ExecutorError;
use core_types::{Signal, SignalType};
use rust_decimal::{Decimal, RoundingStrategy};

/// Monetary values are kept to five decimal places, rounding half away from zero.
const MONEY_DP: u32 = 5;

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// What a pipeline should do with a batch after pricing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persist {
    /// Nothing was priced; the batch is only broadcast.
    Skip,
    /// The opening Buy of a fresh account.
    Single,
    /// A Buy/Sell pair. Once stored, call [`Portfolio::record_saved_pair`].
    Pair,
}

/// The simulated single-asset account of one symbol pipeline.
///
/// The account is either fully in quote currency (`balance`) or fully in the
/// asset (`coin`). Its sole responsibility is to price the signals accepted by a
/// pipeline run and decide whether that batch should be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub balance: Decimal,
    pub coin: Decimal,
    pub total_profit_loss: Decimal,
    /// Number of Buy/Sell pairs stored so far. A pair is only priced when the
    /// accepted batch is exactly two longer than this count.
    pub pending_signal_count: usize,
}

impl Portfolio {
    /// Creates a new flat `Portfolio` with a given amount of starting capital.
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            balance: initial_balance,
            coin: Decimal::ZERO,
            total_profit_loss: Decimal::ZERO,
            pending_signal_count: 0,
        }
    }

    /// Prices the signals accepted by one pipeline run, filling in their derived fields.
    ///
    /// The balance, coin and profit/loss change here. `pending_signal_count` does
    /// not: it only moves once the store has taken the pair.
    pub fn apply_signals(&mut self, signals: &mut [Signal]) -> Result<Persist, ExecutorError> {
        let count = signals.len();

        if count >= 2 && self.pending_signal_count + 2 == count {
            let (head, tail) = signals.split_at_mut(count - 1);
            let first = &head[count - 2];
            let second = &mut tail[0];

            match first.signal_type {
                SignalType::Sell => {
                    let prior_balance = self.balance;
                    self.buy(second, prior_balance)?;
                    second.total_profit_loss = Some(round_money(self.total_profit_loss));
                }
                SignalType::Buy => self.sell(first.price, second)?,
            }

            return Ok(Persist::Pair);
        }

        match signals {
            // Already flat; there is nothing to sell.
            [only] if only.signal_type == SignalType::Sell => Ok(Persist::Skip),
            [only] => {
                let prior_balance = self.balance;
                self.buy(only, prior_balance)?;
                only.total_profit_loss = Some(Decimal::ZERO);
                Ok(Persist::Single)
            }
            _ => Ok(Persist::Skip),
        }
    }

    /// Counts a priced pair as stored.
    pub fn record_saved_pair(&mut self) {
        self.pending_signal_count += 1;
    }

    /// Moves `prior_balance` into the asset at the signal's price.
    fn buy(&mut self, signal: &mut Signal, prior_balance: Decimal) -> Result<(), ExecutorError> {
        if signal.price <= Decimal::ZERO {
            return Err(invalid_price(signal));
        }

        let coin = round_money(
            prior_balance
                .checked_div(signal.price)
                .ok_or_else(|| invalid_price(signal))?,
        );
        self.balance = Decimal::ZERO;
        self.coin = coin;

        signal.remaining_balance = Some(Decimal::ZERO);
        signal.coin = Some(coin);
        tracing::debug!(symbol = %signal.symbol, price = %signal.price, %coin, "Position opened.");
        Ok(())
    }

    /// Liquidates the held coin at the signal's price and realizes the profit against `entry_price`.
    fn sell(&mut self, entry_price: Decimal, signal: &mut Signal) -> Result<(), ExecutorError> {
        let exit_value = signal.price.checked_mul(self.coin).map(round_money);
        let entry_value = entry_price.checked_mul(self.coin).map(round_money);
        let (Some(exit_value), Some(entry_value)) = (exit_value, entry_value) else {
            return Err(invalid_price(signal));
        };
        let profit = round_money(exit_value - entry_value);

        self.balance = exit_value;
        self.total_profit_loss = round_money(self.total_profit_loss + profit);
        self.coin = Decimal::ZERO;

        signal.profit_or_loss = Some(profit);
        signal.remaining_balance = Some(exit_value);
        signal.total_profit_loss = Some(self.total_profit_loss);
        signal.coin = Some(Decimal::ZERO);
        tracing::debug!(
            symbol = %signal.symbol,
            price = %signal.price,
            %profit,
            total = %self.total_profit_loss,
            "Position closed."
        );
        Ok(())
    }
}

fn invalid_price(signal: &Signal) -> ExecutorError {
    ExecutorError::InvalidPrice {
        signal: signal.signal_type.to_string(),
        symbol: signal.symbol.clone(),
        price: signal.price.to_string(),
    }
}
