//! Subscription registry
//!
//! One callback per topic. Pushed frames are routed by topic; service errors
//! answering a subscribe frame are routed back to the topic that sent it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::parser::{ServiceError, Tick};

/// What a topic callback receives
#[derive(Debug, Clone, PartialEq)]
pub enum TopicEvent {
    Tick(Tick),
    /// The service refused the subscription; the binding has been removed
    Rejected(ServiceError),
}

/// Delivery callback for a topic, run on the message-processing task
pub type TopicCallback = Arc<dyn Fn(TopicEvent) + Send + Sync>;

/// Topic to callback bindings
#[derive(Default)]
pub struct SubscriptionRegistry {
    topics: BTreeMap<String, TopicCallback>,
    /// req_id of the latest subscribe frame sent for each topic
    requests: HashMap<u64, String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `callback` as the sole recipient for `topic`
    ///
    /// Returns `true` if the topic was not bound before, meaning the service
    /// still has to be told about it.
    pub fn subscribe(&mut self, topic: &str, callback: TopicCallback) -> bool {
        self.topics.insert(topic.to_string(), callback).is_none()
    }

    /// Remove the binding for `topic`
    pub fn unsubscribe(&mut self, topic: &str) -> bool {
        let removed = self.topics.remove(topic).is_some();
        if removed {
            self.requests.retain(|_, t| t.as_str() != topic);
        }
        removed
    }

    /// Forget every binding
    pub fn clear(&mut self) -> usize {
        let count = self.topics.len();
        self.topics.clear();
        self.requests.clear();
        count
    }

    /// Remember which topic a subscribe frame was sent for
    pub fn record_request(&mut self, req_id: u64, topic: &str) {
        self.requests.retain(|_, t| t.as_str() != topic);
        self.requests.insert(req_id, topic.to_string());
    }

    /// Forget subscribe frame ids, e.g. when the server side was reset
    pub fn clear_requests(&mut self) {
        self.requests.clear();
    }

    /// Deliver a tick to its topic's callback; `false` if nobody is bound
    pub fn dispatch(&self, tick: Tick) -> bool {
        match self.topics.get(&tick.symbol) {
            Some(callback) => {
                callback(TopicEvent::Tick(tick));
                true
            }
            None => false,
        }
    }

    /// Route a service error answering a subscribe frame
    ///
    /// Returns the topic that was rejected; its binding is removed.
    pub fn reject(&mut self, req_id: u64, error: ServiceError) -> Option<String> {
        let topic = self.requests.remove(&req_id)?;
        if let Some(callback) = self.topics.remove(&topic) {
            callback(TopicEvent::Rejected(error));
        }
        Some(topic)
    }

    /// Bound topics, in a stable order
    pub fn topics(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.topics.keys().collect::<Vec<_>>())
            .field("requests", &self.requests)
            .finish()
    }
}
