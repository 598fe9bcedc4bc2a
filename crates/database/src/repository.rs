use crate::error::DbError;
use crate::store::{SaveOutcome, SignalStore, WatchSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Signal, SignalType};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::postgres::{PgListener, PgPool};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// The notification channel raised by the `watch_symbols` trigger.
const WATCH_CHANNEL: &str = "watch_symbols";
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

/// Represents a row from the `watch_symbols` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WatchSymbol {
    pub symbol: String,
    pub created_at: DateTime<Utc>,
}

// A row fetched from the signals table, before the type column is parsed.
#[derive(Debug, FromRow)]
struct DbSignal {
    signal_id: Uuid,
    signal_type: String,
    symbol: String,
    open_time: DateTime<Utc>,
    signal_time: DateTime<Utc>,
    price: Decimal,
    remaining_balance: Option<Decimal>,
    coin: Option<Decimal>,
    profit_or_loss: Option<Decimal>,
    total_profit_loss: Option<Decimal>,
}

impl TryFrom<DbSignal> for Signal {
    type Error = DbError;

    fn try_from(row: DbSignal) -> Result<Self, Self::Error> {
        let signal_type = SignalType::from_str(&row.signal_type)
            .map_err(|e| DbError::InvalidRecord(e.to_string()))?;
        Ok(Signal {
            signal_id: row.signal_id,
            signal_type,
            symbol: row.symbol,
            open_time: row.open_time,
            signal_time: row.signal_time,
            price: row.price,
            remaining_balance: row.remaining_balance,
            coin: row.coin,
            profit_or_loss: row.profit_or_loss,
            total_profit_loss: row.total_profit_loss,
        })
    }
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Adds a symbol to the watch list. Returns `false` if it was already there.
    ///
    /// Symbols are stored upper-cased; the insert fires the notification trigger.
    pub async fn add_watch_symbol(&self, symbol: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            "INSERT INTO watch_symbols (symbol) VALUES ($1) ON CONFLICT (symbol) DO NOTHING",
        )
        .bind(symbol.to_uppercase())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Fetches the watch list, oldest first.
    pub async fn list_watch_symbols(&self) -> Result<Vec<WatchSymbol>, DbError> {
        let rows = sqlx::query_as::<_, WatchSymbol>(
            "SELECT symbol, created_at FROM watch_symbols ORDER BY created_at ASC, symbol ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Fetches the stored signal history of one collection in bar order.
    pub async fn get_signals(&self, collection_key: &str) -> Result<Vec<Signal>, DbError> {
        let rows = sqlx::query_as::<_, DbSignal>(
            r#"
            SELECT signal_id, signal_type, symbol, open_time, signal_time, price,
                   remaining_balance, coin, profit_or_loss, total_profit_loss
            FROM signals
            WHERE collection_key = $1
            ORDER BY open_time ASC, signal_time ASC
            "#,
        )
        .bind(collection_key)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Signal::try_from).collect()
    }
}

#[async_trait]
impl SignalStore for DbRepository {
    /// Inserts the batch in one transaction; the unique constraint turns
    /// already-stored signals into no-ops.
    async fn save_signals(
        &self,
        collection_key: &str,
        signals: &[Signal],
    ) -> Result<SaveOutcome, DbError> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = SaveOutcome::default();

        for signal in signals {
            let result = sqlx::query(
                r#"
                INSERT INTO signals (
                    signal_id, collection_key, signal_type, symbol, open_time, signal_time, price,
                    remaining_balance, coin, profit_or_loss, total_profit_loss
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (collection_key, open_time, symbol, price) DO NOTHING
                "#,
            )
            .bind(signal.signal_id)
            .bind(collection_key)
            .bind(signal.signal_type.as_str())
            .bind(&signal.symbol)
            .bind(signal.open_time)
            .bind(signal.signal_time)
            .bind(signal.price)
            .bind(signal.remaining_balance)
            .bind(signal.coin)
            .bind(signal.profit_or_loss)
            .bind(signal.total_profit_loss)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 1 {
                outcome.inserted += 1;
            } else {
                outcome.skipped += 1;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl WatchSource for DbRepository {
    async fn list_symbols(&self) -> Result<Vec<String>, DbError> {
        let rows = self.list_watch_symbols().await?;
        Ok(rows.into_iter().map(|row| row.symbol).collect())
    }

    /// Listens on the `watch_symbols` channel from a background task.
    ///
    /// The listener is opened before returning so that startup fails loudly if
    /// the database refuses it. Later receive errors are logged and retried.
    async fn subscribe_to_additions(&self) -> Result<mpsc::Receiver<String>, DbError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(WATCH_CHANNEL).await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            loop {
                // `recv` re-establishes a dropped connection and re-subscribes on the next call.
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::error!(error = %e, "Watch symbol listener error. Retrying...");
                        tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                        continue;
                    }
                };

                let symbol = notification.payload().trim().to_string();
                if symbol.is_empty() {
                    continue;
                }
                tracing::debug!(symbol = %symbol, "Watch symbol notification received.");
                if tx.send(symbol).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
