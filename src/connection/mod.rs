//! Connection lifecycle
//!
//! All mutable client state is owned by one task, the [`ConnectionManager`].
//! Callers talk to it through [`Command`]s; transport tasks report back
//! through [`LinkEvent`]s.

mod manager;
mod reconnect;
mod state;

use std::time::Duration;

use tokio::sync::oneshot;

use crate::correlator::{ReplySender, RequestKind};
use crate::error::{Result, StreamError};
use crate::requests::Payload;
use crate::subscriptions::TopicCallback;
use crate::transport::Link;

pub(crate) use manager::ConnectionManager;
pub use reconnect::{BackoffConfig, ReconnectPolicy};
pub use state::ConnectionState;

/// A reply-bearing request handed to the manager
pub(crate) struct RequestCommand {
    pub req_id: u64,
    pub payload: Payload,
    pub kind: RequestKind,
    pub timeout: Duration,
    pub reply: ReplySender,
}

pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    ForceReconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    Request(RequestCommand),
    Cancel {
        req_id: u64,
    },
    Subscribe {
        topic: String,
        callback: TopicCallback,
        reply: oneshot::Sender<Result<()>>,
    },
    Unsubscribe {
        topic: String,
        reply: oneshot::Sender<Result<()>>,
    },
    UnsubscribeAll {
        reply: oneshot::Sender<Result<()>>,
    },
    Stats {
        reply: oneshot::Sender<ManagerStats>,
    },
}

/// Reports from connect attempts and per-connection reader tasks
///
/// `epoch` identifies the attempt; events from superseded attempts are
/// discarded.
pub(crate) enum LinkEvent {
    Established {
        epoch: u64,
        link: Link,
    },
    Failed {
        epoch: u64,
        endpoint: String,
        error: StreamError,
    },
    Frame {
        epoch: u64,
        text: String,
    },
    Closed {
        epoch: u64,
        reason: String,
    },
}

/// Point-in-time view of the manager's bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerStats {
    pub state: ConnectionState,
    /// Transmitted requests awaiting a reply
    pub pending_requests: usize,
    /// Requests waiting for the connection to open
    pub queued_requests: usize,
    /// Correlator identifiers currently tracked
    pub pending_ids: Vec<u64>,
    pub topics: Vec<String>,
    pub reconnect_failures: u32,
    pub endpoint: String,
    pub authenticated: bool,
    /// Balance changes are being pushed by the service
    pub balance_stream: bool,
}

impl ManagerStats {
    pub fn is_tracking(&self, req_id: u64) -> bool {
        self.pending_ids.contains(&req_id)
    }
}
