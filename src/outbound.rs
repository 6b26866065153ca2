//! Outbound queue for requests issued while the connection is not open

use std::collections::VecDeque;
use std::time::Duration;

use crate::correlator::{ReplySender, RequestKind};
use crate::error::StreamError;

/// A request waiting for the connection to open
pub struct QueuedRequest {
    pub req_id: u64,
    /// Encoded frame, `req_id` already stamped
    pub frame: String,
    pub kind: RequestKind,
    pub timeout: Duration,
    pub reply: Option<ReplySender>,
}

/// FIFO of unsent requests
#[derive(Default)]
pub struct OutboundQueue {
    entries: VecDeque<QueuedRequest>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: QueuedRequest) {
        self.entries.push_back(request);
    }

    /// Next request in submission order
    pub fn pop(&mut self) -> Option<QueuedRequest> {
        self.entries.pop_front()
    }

    /// Put back a request whose send failed so it keeps its place
    pub fn requeue_front(&mut self, request: QueuedRequest) {
        self.entries.push_front(request);
    }

    /// Remove a request whose caller stopped waiting
    pub fn remove(&mut self, req_id: u64) -> bool {
        match self.entries.iter().position(|r| r.req_id == req_id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Fail and drop every queued request
    pub fn fail_all(&mut self, error: StreamError) -> usize {
        let count = self.entries.len();
        for request in self.entries.drain(..) {
            if let Some(reply) = request.reply {
                let _ = reply.send(Err(error.clone()));
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn queued(req_id: u64, reply: Option<ReplySender>) -> QueuedRequest {
        QueuedRequest {
            req_id,
            frame: format!(r#"{{"ping":1,"req_id":{}}}"#, req_id),
            kind: RequestKind::Generic,
            timeout: Duration::from_secs(5),
            reply,
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = OutboundQueue::new();
        queue.push(queued(1, None));
        queue.push(queued(2, None));
        queue.push(queued(3, None));

        let order: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|r| r.req_id).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_requeue_front_keeps_position() {
        let mut queue = OutboundQueue::new();
        queue.push(queued(1, None));
        queue.push(queued(2, None));

        let first = queue.pop().unwrap();
        queue.requeue_front(first);
        assert_eq!(queue.pop().unwrap().req_id, 1);
    }

    #[test]
    fn test_remove_by_id() {
        let mut queue = OutboundQueue::new();
        queue.push(queued(1, None));
        queue.push(queued(2, None));
        assert!(queue.remove(1));
        assert!(!queue.remove(1));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_all_notifies_callers() {
        let mut queue = OutboundQueue::new();
        let (tx, rx) = oneshot::channel();
        queue.push(queued(1, Some(tx)));

        assert_eq!(queue.fail_all(StreamError::Disconnected), 1);
        assert!(queue.is_empty());
        assert_eq!(rx.await.unwrap(), Err(StreamError::Disconnected));
    }
}
