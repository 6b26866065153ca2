//! Public client façade
//!
//! [`StreamClient`] is a cheap, cloneable handle onto one connection manager
//! task. Lifecycle calls and subscriptions are async and wait for the
//! manager's answer. Correlated requests are submitted as soon as they are
//! called and return a [`Reply`] future; dropping that future abandons the
//! request.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::{Command, ConnectionManager, ConnectionState, ManagerStats, RequestCommand};
use crate::correlator::{RequestIds, RequestKind};
use crate::error::{Result, StreamError};
use crate::events::{ClientEvent, EventFanout};
use crate::metrics::ClientMetrics;
use crate::parser::{decode_field, Account, Balance, History, OrderReceipt};
use crate::requests::{self, OrderParams, Payload};
use crate::subscriptions::TopicEvent;
use crate::transport::{Connector, WebSocketConnector};

struct Inner {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    events: Arc<EventFanout>,
    ids: Arc<RequestIds>,
    config: Arc<ClientConfig>,
    metrics: ClientMetrics,
}

/// Handle onto a streaming connection
///
/// Must be created inside a tokio runtime. The connection manager keeps
/// running until every handle and every outstanding [`Reply`] is dropped.
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<Inner>,
}

impl StreamClient {
    /// Create a client that dials its endpoints over WebSocket
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(WebSocketConnector::new()))
    }

    /// Create a client over a custom transport
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let config = Arc::new(config);
        let metrics = ClientMetrics::new()?;
        let events = Arc::new(EventFanout::new(config.event_capacity));
        let ids = Arc::new(RequestIds::new());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

        let manager = ConnectionManager::new(
            Arc::clone(&config),
            connector,
            command_rx,
            state_tx,
            Arc::clone(&events),
            metrics.clone(),
            Arc::clone(&ids),
        );
        tokio::spawn(manager.run());

        Ok(Self {
            inner: Arc::new(Inner {
                commands,
                state,
                events,
                ids,
                config,
                metrics,
            }),
        })
    }

    /// Open the connection, resolving once it is open or the client gives up
    ///
    /// Returns immediately when already open. Concurrent callers share the
    /// same attempt.
    pub async fn connect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { reply })?;
        rx.await.map_err(|_| StreamError::ClientClosed)?
    }

    /// Close the connection and stop reconnecting until the next `connect`
    ///
    /// Clears every subscription and fails every pending request.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Disconnect { reply })?;
        rx.await.map_err(|_| StreamError::ClientClosed)
    }

    /// Drop the current transport and dial again with a fresh retry budget
    pub async fn force_reconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ForceReconnect { reply })?;
        rx.await.map_err(|_| StreamError::ClientClosed)?
    }

    /// True iff the connection is open
    pub fn connection_status(&self) -> bool {
        self.state().is_open()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Wait until the connection reaches `state`
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<()> {
        let mut rx = self.inner.state.clone();
        rx.wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| StreamError::ClientClosed)
    }

    /// Handler for "connected"; fires at once if the connection is open
    pub fn on_open<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.events.set_on_open(Arc::new(move |()| handler()));
    }

    pub fn on_close<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.events.set_on_close(Arc::new(move |()| handler()));
    }

    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(StreamError) + Send + Sync + 'static,
    {
        self.inner.events.set_on_error(Arc::new(handler));
    }

    /// Handler for identity changes; `None` after logout
    pub fn on_authenticated<F>(&self, handler: F)
    where
        F: Fn(Option<Account>) + Send + Sync + 'static,
    {
        self.inner.events.set_on_authenticated(Arc::new(handler));
    }

    pub fn on_balance<F>(&self, handler: F)
    where
        F: Fn(Balance) + Send + Sync + 'static,
    {
        self.inner.events.set_on_balance(Arc::new(handler));
    }

    /// Listener for every lifecycle event, independent of the handler slots
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Route pushes for `topic` to `callback`, replacing any previous one
    ///
    /// While offline the binding is recorded and sent once the connection
    /// opens.
    pub async fn subscribe<F>(&self, topic: &str, callback: F) -> Result<()>
    where
        F: Fn(TopicEvent) + Send + Sync + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe {
            topic: topic.to_string(),
            callback: Arc::new(callback),
            reply,
        })?;
        rx.await.map_err(|_| StreamError::ClientClosed)?
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unsubscribe {
            topic: topic.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| StreamError::ClientClosed)?
    }

    pub async fn unsubscribe_all(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::UnsubscribeAll { reply })?;
        rx.await.map_err(|_| StreamError::ClientClosed)?
    }

    /// Fetch the latest `count` ticks for `topic`
    pub fn request_history(&self, topic: &str, count: u32) -> Reply<History> {
        self.request(
            Ok(requests::ticks_history(topic, count)),
            RequestKind::History,
            self.inner.config.history_timeout,
            |frame| decode_field(&frame, "history"),
        )
    }

    /// Authorize the session; the token is replayed after reconnects
    pub fn authorize(&self, token: &str) -> Reply<Account> {
        self.request(
            Ok(requests::authorize(token)),
            RequestKind::Authorize {
                token: token.to_string(),
            },
            self.inner.config.request_timeout,
            |frame| decode_field(&frame, "authorize"),
        )
    }

    pub fn logout(&self) -> Reply<()> {
        self.request(
            Ok(requests::logout()),
            RequestKind::Logout,
            self.inner.config.request_timeout,
            |_| Ok(()),
        )
    }

    /// Current balance; later changes arrive through `on_balance`
    pub fn balance(&self) -> Reply<Balance> {
        self.request(
            Ok(requests::balance()),
            RequestKind::Balance,
            self.inner.config.request_timeout,
            |frame| decode_field(&frame, "balance"),
        )
    }

    pub fn place_order(&self, params: &OrderParams) -> Reply<OrderReceipt> {
        self.request(
            requests::buy(params),
            RequestKind::Order,
            self.inner.config.request_timeout,
            |frame| decode_field(&frame, "buy"),
        )
    }

    /// Send any reply-bearing request and get the whole reply frame
    pub fn send_request(&self, payload: Value) -> Reply<Value> {
        self.request(
            requests::payload_from(payload),
            RequestKind::Generic,
            self.inner.config.request_timeout,
            Ok,
        )
    }

    fn request<T>(
        &self,
        payload: Result<Payload>,
        kind: RequestKind,
        timeout: Duration,
        decode: fn(Value) -> Result<T>,
    ) -> Reply<T> {
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => return Reply::failed(e, decode),
        };

        let req_id = self.inner.ids.next_id();
        let (reply, rx) = oneshot::channel();
        let command = Command::Request(RequestCommand {
            req_id,
            payload,
            kind,
            timeout,
            reply,
        });
        if self.send(command).is_err() {
            return Reply::failed(StreamError::ClientClosed, decode);
        }

        Reply {
            state: ReplyState::Pending(PendingReply {
                req_id,
                rx,
                commands: self.inner.commands.clone(),
                settled: false,
            }),
            decode,
        }
    }

    /// Snapshot of the manager's queues and tables
    pub async fn stats(&self) -> Result<ManagerStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats { reply })?;
        rx.await.map_err(|_| StreamError::ClientClosed)
    }

    /// Metrics of this client, for registration into a registry
    pub fn metrics(&self) -> &ClientMetrics {
        &self.inner.metrics
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    fn send(&self, command: Command) -> Result<()> {
        self.inner
            .commands
            .send(command)
            .map_err(|_| StreamError::ClientClosed)
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("state", &self.state())
            .field("endpoints", &self.inner.config.endpoints)
            .finish()
    }
}

/// Future resolving to the decoded reply of a correlated request
///
/// The request is already submitted when this value exists. Dropping it
/// before completion removes the request from the queue or the pending
/// table; a frame already written is not recalled.
///
/// Timeouts start when the frame is written. A request still queued when
/// the client gives up reconnecting stays queued and this future stays
/// pending until a later `connect`/`force_reconnect` sends it, `disconnect`
/// fails it, or the caller drops it. Wrap it in `tokio::time::timeout` to
/// bound the wait.
#[must_use = "dropping a Reply abandons the request"]
pub struct Reply<T> {
    state: ReplyState,
    decode: fn(Value) -> Result<T>,
}

enum ReplyState {
    Pending(PendingReply),
    Failed(Option<StreamError>),
}

struct PendingReply {
    req_id: u64,
    rx: oneshot::Receiver<Result<Value>>,
    commands: mpsc::UnboundedSender<Command>,
    settled: bool,
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if !self.settled {
            debug!(req_id = self.req_id, "Reply dropped before completion");
            let _ = self.commands.send(Command::Cancel {
                req_id: self.req_id,
            });
        }
    }
}

impl<T> Reply<T> {
    fn failed(error: StreamError, decode: fn(Value) -> Result<T>) -> Self {
        Self {
            state: ReplyState::Failed(Some(error)),
            decode,
        }
    }

    /// Identifier the request was sent with, if it was submitted
    pub fn req_id(&self) -> Option<u64> {
        match &self.state {
            ReplyState::Pending(pending) => Some(pending.req_id),
            ReplyState::Failed(_) => None,
        }
    }
}

impl<T> Future for Reply<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let decode = this.decode;

        match &mut this.state {
            ReplyState::Failed(error) => {
                Poll::Ready(Err(error.take().unwrap_or(StreamError::ClientClosed)))
            }
            ReplyState::Pending(pending) => match Pin::new(&mut pending.rx).poll(cx) {
                Poll::Ready(Ok(outcome)) => {
                    pending.settled = true;
                    Poll::Ready(outcome.and_then(decode))
                }
                Poll::Ready(Err(_)) => {
                    pending.settled = true;
                    Poll::Ready(Err(StreamError::ClientClosed))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
