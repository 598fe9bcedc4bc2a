use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Cannot price a {signal} signal for {symbol} at a non-positive price: {price}")]
    InvalidPrice {
        signal: String,
        symbol: String,
        price: String,
    },
}
