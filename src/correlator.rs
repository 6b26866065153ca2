//! Request correlation
//!
//! Matches replies to the requests that asked for them by `req_id`, and
//! fails requests whose reply does not arrive in time.

use std::collections::HashMap;
use std::future::poll_fn;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::time::{delay_queue, DelayQueue};

use crate::error::{Result, StreamError};

/// Completion handle of a reply-bearing request
pub type ReplySender = oneshot::Sender<Result<Value>>;

/// Monotonic request identifier source, shared by a client and its manager
#[derive(Debug)]
pub struct RequestIds {
    next: AtomicU64,
}

impl RequestIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// What a request was, so its reply can drive side effects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Generic,
    History,
    Authorize { token: String },
    /// Authorization replayed by the client after a reconnect
    Reauthorize { token: String },
    Logout,
    Balance,
    Order,
}

struct Pending {
    key: delay_queue::Key,
    kind: RequestKind,
    timeout: Duration,
    reply: Option<ReplySender>,
}

/// Table of transmitted requests awaiting a reply
pub struct RequestCorrelator {
    pending: HashMap<u64, Pending>,
    deadlines: DelayQueue<u64>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            deadlines: DelayQueue::new(),
        }
    }

    /// Track a request that has just been written to the transport
    ///
    /// `reply` is `None` for requests the client issues on its own behalf.
    pub fn insert(
        &mut self,
        req_id: u64,
        kind: RequestKind,
        timeout: Duration,
        reply: Option<ReplySender>,
    ) {
        let key = self.deadlines.insert(req_id, timeout);
        if let Some(previous) = self.pending.insert(
            req_id,
            Pending {
                key,
                kind,
                timeout,
                reply,
            },
        ) {
            self.deadlines.remove(&previous.key);
        }
    }

    /// Resolve the request with a reply, returning its kind if it was pending
    ///
    /// Unknown identifiers (never issued, already timed out, cancelled) are
    /// ignored.
    pub fn resolve(&mut self, req_id: u64, outcome: Result<Value>) -> Option<RequestKind> {
        let pending = self.pending.remove(&req_id)?;
        self.deadlines.remove(&pending.key);
        if let Some(reply) = pending.reply {
            let _ = reply.send(outcome);
        }
        Some(pending.kind)
    }

    /// Drop a request whose caller stopped waiting
    pub fn cancel(&mut self, req_id: u64) -> bool {
        match self.pending.remove(&req_id) {
            Some(pending) => {
                self.deadlines.remove(&pending.key);
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding request and clear the table
    pub fn fail_all(&mut self, error: StreamError) -> usize {
        let count = self.pending.len();
        for (_, pending) in self.pending.drain() {
            if let Some(reply) = pending.reply {
                let _ = reply.send(Err(error.clone()));
            }
        }
        self.deadlines.clear();
        count
    }

    /// Wait for the next request to time out, fail it, and return its id
    ///
    /// Never completes while the table is empty.
    pub async fn expire_next(&mut self) -> u64 {
        loop {
            if self.deadlines.is_empty() {
                std::future::pending::<()>().await;
            }

            let expired = match poll_fn(|cx| self.deadlines.poll_expired(cx)).await {
                Some(expired) => expired,
                None => continue,
            };
            let req_id = expired.into_inner();

            if let Some(pending) = self.pending.remove(&req_id) {
                if let Some(reply) = pending.reply {
                    let _ = reply.send(Err(StreamError::Timeout {
                        req_id,
                        after: pending.timeout,
                    }));
                }
                return req_id;
            }
        }
    }

    /// Tracked identifiers, ascending
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pending.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn contains(&self, req_id: u64) -> bool {
        self.pending.contains_key(&req_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
