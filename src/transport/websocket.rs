//! WebSocket transport
//!
//! Opens the connection, then splits it so reads and writes can proceed
//! independently.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use super::{Connector, FrameSink, FrameSource, Link};
use crate::error::{Result, StreamError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector that dials `ws://` and `wss://` endpoints
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link> {
        info!(endpoint = %endpoint, "Connecting to quote stream");

        let (ws_stream, response) = connect_async(endpoint).await.map_err(|e| {
            StreamError::Transport(format!("Failed to connect to {}: {}", endpoint, e))
        })?;

        info!(status = ?response.status(), endpoint = %endpoint, "WebSocket connected");

        let (sink, stream) = ws_stream.split();
        Ok(Link::new(WsSink { sink }, WsSource { stream }))
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| StreamError::Message(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "client disconnect".into(),
        };
        self.sink.send(Message::Close(Some(frame))).await?;
        self.sink.close().await?;
        Ok(())
    }
}

struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    debug!(len = text.len(), "Received text frame");
                    return Some(Ok(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Some(Ok(String::from_utf8_lossy(&data).to_string()));
                }
                // Pongs for pings are queued by tungstenite and flushed with the next write
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    warn!(frame = ?frame, "Received close frame");
                    return None;
                }
                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    return Some(Err(StreamError::Message(e.to_string())));
                }
                None => {
                    warn!("WebSocket stream ended");
                    return None;
                }
            }
        }
    }
}
