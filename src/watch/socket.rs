//! WebSocket connection and frame handling for the store watch endpoint

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WatchSocket {
    stream: WsStream,
}

impl WatchSocket {
    /// Connect to a watch/inbox WebSocket endpoint.
    ///
    /// Auth rides in the URL query string; no headers are needed on the
    /// socket itself.
    pub async fn connect(url: &str) -> Result<Self> {
        let ws_url = url
            .replace("https://", "wss://")
            .replace("http://", "ws://");

        tracing::debug!("Connecting WebSocket to {}", ws_url);

        let (stream, response) = connect_async(&ws_url)
            .await
            .context("WebSocket connection failed")?;

        tracing::debug!("WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }

    /// Send one JSON text frame.
    pub async fn send_json(&mut self, v: &Value) -> Result<()> {
        let text = v.to_string();
        tracing::debug!("WS send: {}", text);
        self.stream
            .send(Message::Text(text))
            .await
            .context("Failed to send WebSocket message")
    }

    /// Receive the next JSON frame, answering pings along the way.
    /// Returns `None` on a clean close. Frames that do not parse as JSON
    /// are skipped.
    pub async fn recv_json(&mut self) -> Result<Option<Value>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!("WS recv: {}", text);
                    match serde_json::from_str(&text) {
                        Ok(v) => return Ok(Some(v)),
                        Err(e) => {
                            tracing::debug!("Skipping non-JSON frame: {}", e);
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::trace!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket receive error");
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }
}
