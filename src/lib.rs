//! Quote Stream - resilient streaming market-data client
//!
//! This crate keeps one logical WebSocket connection to a market-data
//! service alive across failures, correlates request/reply pairs by
//! identifier, and routes pushed ticks to per-topic callbacks.

pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod events;
pub mod metrics;
pub mod outbound;
pub mod parser;
pub mod requests;
pub mod subscriptions;
pub mod transport;

pub use client::{Reply, StreamClient};
pub use config::{ClientConfig, Config};
pub use connection::{ConnectionState, ManagerStats};
pub use error::{Result, StreamError};
pub use events::{ClientEvent, EventKind};
pub use metrics::ClientMetrics;
pub use parser::{Account, Balance, History, OrderReceipt, ServiceError, Tick};
pub use requests::OrderParams;
pub use subscriptions::TopicEvent;
pub use transport::{Connector, FrameSink, FrameSource, Link, WebSocketConnector};
