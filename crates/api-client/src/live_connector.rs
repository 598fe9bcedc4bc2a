use crate::error::ApiError;
use crate::kline::parse_kline_tick;
use async_trait::async_trait;
use configuration::StreamConfig;
use core_types::RawTick;
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// A stream of text frames from one open connection. The stream ending means the
/// connection closed; an `Err` item is a protocol error.
pub type FrameStream = BoxStream<'static, Result<String, ApiError>>;

/// Opens market-data connections. Abstracted so the reconnect loop can run
/// against a scripted transport in tests.
#[async_trait]
pub trait KlineTransport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<FrameStream, ApiError>;
}

/// The production transport over `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct WsTransport;

#[async_trait]
impl KlineTransport for WsTransport {
    async fn open(&self, url: &Url) -> Result<FrameStream, ApiError> {
        let (stream, _) = connect_async(url.as_str()).await?;

        let frames = stream.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "WebSocket close frame received.");
                    None
                }
                // Ping/pong are answered by tungstenite; binary frames are not part of the kline API.
                Ok(_) => None,
                Err(e) => Some(Err(ApiError::from(e))),
            }
        });

        Ok(frames.boxed())
    }
}

/// Everything a pipeline can observe about its connection.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    Tick(RawTick),
    Disconnected,
}

/// Owns the background task of one symbol's connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    symbol: String,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Cancels the connection task, including any pending reconnect.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Handles connections to the kline stream, one reconnecting task per symbol.
#[derive(Clone)]
pub struct LiveConnector {
    base_url: Url,
    interval: String,
    reconnect_delay: Duration,
    channel_capacity: usize,
    transport: Arc<dyn KlineTransport>,
}

impl LiveConnector {
    pub fn new(config: &StreamConfig) -> Result<Self, ApiError> {
        Self::with_transport(config, Arc::new(WsTransport))
    }

    pub fn with_transport(
        config: &StreamConfig,
        transport: Arc<dyn KlineTransport>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            base_url: Url::parse(&config.base_url)?,
            interval: config.interval.clone(),
            reconnect_delay: config.reconnect_delay(),
            channel_capacity: config.channel_capacity,
            transport,
        })
    }

    /// The single-stream endpoint for `symbol`, e.g. `/ws/btcusdt@kline_1m`.
    pub fn stream_url(&self, symbol: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("/ws/{}@kline_{}", symbol.to_lowercase(), self.interval));
        url
    }

    /// Opens the stream for `symbol` and returns immediately.
    ///
    /// The spawned task reconnects after every close or failed open, forever, with a
    /// fixed delay. It only exits when the returned receiver is dropped or the handle
    /// is aborted.
    pub fn connect(&self, symbol: &str) -> (ConnectionHandle, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let url = self.stream_url(symbol);
        let transport = Arc::clone(&self.transport);
        let delay = self.reconnect_delay;
        let task_symbol = symbol.to_string();

        tracing::debug!(symbol = %symbol, %url, "Spawning kline connection.");

        let task = tokio::spawn(async move {
            let symbol = task_symbol;
            loop {
                match transport.open(&url).await {
                    Ok(mut frames) => {
                        tracing::info!(symbol = %symbol, "WebSocket connected.");
                        if tx.send(StreamEvent::Connected).await.is_err() {
                            return;
                        }

                        while let Some(frame) = frames.next().await {
                            match frame {
                                Ok(text) => match parse_kline_tick(&text) {
                                    Ok(tick) => {
                                        if tx.send(StreamEvent::Tick(tick)).await.is_err() {
                                            tracing::debug!(symbol = %symbol, "Pipeline dropped. Closing WebSocket connection.");
                                            return;
                                        }
                                    }
                                    // Not a kline payload (subscription acks, garbage); skip it.
                                    Err(e) => tracing::trace!(symbol = %symbol, error = %e, "Dropped frame."),
                                },
                                Err(e) => {
                                    tracing::error!(symbol = %symbol, error = %e, "WebSocket error.");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(symbol = %symbol, error = %e, "WebSocket connection error.");
                    }
                }

                tracing::warn!(
                    symbol = %symbol,
                    delay_ms = delay.as_millis() as u64,
                    "WebSocket disconnected. Reconnecting..."
                );
                if tx.send(StreamEvent::Disconnected).await.is_err() {
                    return;
                }
                tokio::time::sleep(delay).await;
            }
        });

        (
            ConnectionHandle {
                symbol: symbol.to_string(),
                task,
            },
            rx,
        )
    }
}
