//! In-memory transport for driving a client end to end
//!
//! Every accepted connection is handed to the test as a [`ServerSide`], which
//! reads what the client wrote and pushes frames back.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use quote_stream::{ClientConfig, Connector, FrameSink, FrameSource, Link, Result, StreamError};

pub const ENDPOINT_A: &str = "ws://a.test";
pub const ENDPOINT_B: &str = "ws://b.test";

/// Client settings with short, round timings
pub fn test_config(endpoints: &[&str]) -> ClientConfig {
    ClientConfig {
        connect_timeout: Duration::from_secs(5),
        keepalive_interval: Duration::from_secs(30),
        request_timeout: Duration::from_secs(10),
        history_timeout: Duration::from_secs(20),
        backoff_base: Duration::from_secs(1),
        backoff_max: Duration::from_secs(8),
        max_reconnect_attempts: 5,
        ..ClientConfig::with_endpoints(endpoints.iter().copied())
    }
}

#[derive(Default)]
struct Shared {
    refused: Mutex<HashSet<String>>,
    stalled: Mutex<HashSet<String>>,
    failing_writes: AtomicBool,
    attempts: Mutex<Vec<String>>,
    open: AtomicUsize,
    max_open: AtomicUsize,
}

/// Connector whose endpoints either refuse or hand a session to the test
#[derive(Clone)]
pub struct ScriptedConnector {
    shared: Arc<Shared>,
    sessions: mpsc::UnboundedSender<ServerSide>,
}

impl ScriptedConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerSide>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: Arc::new(Shared::default()),
                sessions,
            },
            rx,
        )
    }

    pub fn refuse(&self, endpoint: &str) {
        self.shared.refused.lock().insert(endpoint.to_string());
    }

    pub fn accept(&self, endpoint: &str) {
        self.shared.refused.lock().remove(endpoint);
        self.shared.stalled.lock().remove(endpoint);
    }

    /// Make dials to `endpoint` hang without ever completing the handshake
    pub fn stall(&self, endpoint: &str) {
        self.shared.stalled.lock().insert(endpoint.to_string());
    }

    /// Make every write on every link fail while set
    pub fn fail_writes(&self, failing: bool) {
        self.shared.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Endpoints dialled so far, in order
    pub fn attempts(&self) -> Vec<String> {
        self.shared.attempts.lock().clone()
    }

    /// Transports currently open
    pub fn open_links(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Highest number of transports ever open at once
    pub fn max_open_links(&self) -> usize {
        self.shared.max_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link> {
        self.shared.attempts.lock().push(endpoint.to_string());
        if self.shared.refused.lock().contains(endpoint) {
            return Err(StreamError::Transport(format!("{} refused", endpoint)));
        }
        if self.shared.stalled.lock().contains(endpoint) {
            std::future::pending::<()>().await;
        }

        let (client_tx, from_client) = mpsc::unbounded_channel();
        let (to_client, client_rx) = mpsc::unbounded_channel();

        let open = self.shared.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_open.fetch_max(open, Ordering::SeqCst);

        let _ = self.sessions.send(ServerSide {
            endpoint: endpoint.to_string(),
            from_client,
            to_client: Some(to_client),
        });

        Ok(Link::new(
            MemorySink {
                tx: Some(client_tx),
                shared: Arc::clone(&self.shared),
            },
            MemorySource { rx: client_rx },
        ))
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
    shared: Arc<Shared>,
}

impl MemorySink {
    fn release(&mut self) {
        if self.tx.take().is_some() {
            self.shared.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, text: String) -> Result<()> {
        if self.shared.failing_writes.load(Ordering::SeqCst) {
            return Err(StreamError::Message("broken pipe".to_string()));
        }
        let tx = self.tx.as_ref().ok_or(StreamError::ConnectionLost)?;
        tx.send(text)
            .map_err(|_| StreamError::Transport("peer went away".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemorySink {
    fn drop(&mut self) {
        self.release();
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }
}

/// Server end of one accepted connection
pub struct ServerSide {
    pub endpoint: String,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: Option<mpsc::UnboundedSender<String>>,
}

impl ServerSide {
    /// Next frame the client wrote, skipping keepalive pings
    pub async fn next_frame(&mut self) -> Value {
        loop {
            let raw = self
                .from_client
                .recv()
                .await
                .expect("client closed the connection");
            let frame: Value = serde_json::from_str(&raw).expect("client sent invalid JSON");
            if frame.get("ping").is_none() {
                return frame;
            }
        }
    }

    /// Next frame including keepalive pings
    pub async fn next_raw(&mut self) -> Option<Value> {
        let raw = self.from_client.recv().await?;
        serde_json::from_str(&raw).ok()
    }

    /// Frames already written by the client, without waiting or pings
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(raw) = self.from_client.try_recv() {
            if let Ok(frame) = serde_json::from_str::<Value>(&raw) {
                if frame.get("ping").is_none() {
                    frames.push(frame);
                }
            }
        }
        frames
    }

    /// Frames already written by the client, pings included
    pub fn drain_raw(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(raw) = self.from_client.try_recv() {
            if let Ok(frame) = serde_json::from_str(&raw) {
                frames.push(frame);
            }
        }
        frames
    }

    pub fn push(&self, frame: Value) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(frame.to_string());
        }
    }

    /// Reply to `request`, echoing its identifier
    pub fn reply(&self, request: &Value, msg_type: &str, body: Value) {
        let mut frame = serde_json::json!({
            "msg_type": msg_type,
            "req_id": request["req_id"].clone(),
            "echo_req": request.clone(),
        });
        frame[msg_type] = body;
        self.push(frame);
    }

    /// Drop the server end as if the network went away
    pub fn drop_connection(&mut self) {
        self.to_client = None;
    }
}

pub fn tick(symbol: &str, quote: f64) -> Value {
    serde_json::json!({
        "msg_type": "tick",
        "tick": { "symbol": symbol, "quote": quote, "epoch": 1_700_000_000 }
    })
}

/// Wait for the next session, failing the test instead of hanging
pub async fn next_session(sessions: &mut mpsc::UnboundedReceiver<ServerSide>) -> ServerSide {
    tokio::time::timeout(Duration::from_secs(300), sessions.recv())
        .await
        .expect("no connection within the deadline")
        .expect("connector dropped")
}

/// Let the client's tasks run until they are idle
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
