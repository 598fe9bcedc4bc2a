use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid stream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid data format from stream: {0}")]
    InvalidData(String),
}
