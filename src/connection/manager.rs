//! Connection manager
//!
//! Owns the transport, the reconnect and keepalive timers, the outbound
//! queue, the request correlator and the subscription registry. Runs as a
//! single task so no two writes interleave and no timer state is shared.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, trace, warn};

use super::{
    BackoffConfig, Command, ConnectionState, LinkEvent, ManagerStats, ReconnectPolicy,
    RequestCommand,
};
use crate::config::ClientConfig;
use crate::correlator::{RequestCorrelator, RequestIds, RequestKind};
use crate::error::{Result, StreamError};
use crate::events::{ClientEvent, EventFanout};
use crate::metrics::ClientMetrics;
use crate::outbound::{OutboundQueue, QueuedRequest};
use crate::parser::{Account, Inbound};
use crate::requests;
use crate::subscriptions::{SubscriptionRegistry, TopicCallback};
use crate::transport::{Connector, FrameSink, FrameSource, Link};

/// Single owner of all connection state
pub(crate) struct ConnectionManager {
    config: Arc<ClientConfig>,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<Command>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    state_tx: watch::Sender<ConnectionState>,
    events: Arc<EventFanout>,
    metrics: ClientMetrics,
    ids: Arc<RequestIds>,
    policy: ReconnectPolicy,

    /// Write half of the open transport; at most one at a time
    sink: Option<Box<dyn FrameSink>>,
    reader: Option<JoinHandle<()>>,
    attempt: Option<JoinHandle<()>>,
    /// Bumped on every attempt and teardown
    epoch: u64,
    /// Set by an explicit disconnect; suppresses reconnection
    manual_disconnect: bool,

    reconnect_timer: Option<Pin<Box<Sleep>>>,
    keepalive: Option<Interval>,

    queue: OutboundQueue,
    correlator: RequestCorrelator,
    subscriptions: SubscriptionRegistry,
    connect_waiters: Vec<oneshot::Sender<Result<()>>>,
    /// Token of the last successful authorization, replayed after reconnects
    auth_token: Option<String>,
    /// Service-side balance subscription, restored after re-authorization
    balance_stream: bool,
}

impl ConnectionManager {
    pub(crate) fn new(
        config: Arc<ClientConfig>,
        connector: Arc<dyn Connector>,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
        events: Arc<EventFanout>,
        metrics: ClientMetrics,
        ids: Arc<RequestIds>,
    ) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy::new(
            BackoffConfig::from(config.as_ref()),
            config.endpoints.clone(),
        );

        Self {
            config,
            connector,
            commands,
            link_tx,
            link_rx,
            state_tx,
            events,
            metrics,
            ids,
            policy,
            sink: None,
            reader: None,
            attempt: None,
            epoch: 0,
            manual_disconnect: false,
            reconnect_timer: None,
            keepalive: None,
            queue: OutboundQueue::new(),
            correlator: RequestCorrelator::new(),
            subscriptions: SubscriptionRegistry::new(),
            connect_waiters: Vec::new(),
            auth_token: None,
            balance_stream: false,
        }
    }

    /// Run until every client handle has been dropped
    pub(crate) async fn run(mut self) {
        info!(endpoints = ?self.config.endpoints, "Connection manager started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = self.link_rx.recv() => self.handle_link_event(event).await,
                () = wait_timer(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    self.start_attempt();
                }
                () = wait_tick(&mut self.keepalive) => self.send_keepalive().await,
                req_id = self.correlator.expire_next() => {
                    self.metrics.requests_timed_out.inc();
                    warn!(req_id, "Request timed out");
                    self.update_gauges();
                }
            }
        }

        self.shutdown().await;
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => self.connect(reply),
            Command::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
            }
            Command::ForceReconnect { reply } => self.force_reconnect(reply).await,
            Command::Request(request) => self.submit(request).await,
            Command::Cancel { req_id } => {
                if self.correlator.cancel(req_id) || self.queue.remove(req_id) {
                    debug!(req_id, "Request abandoned by caller");
                    self.update_gauges();
                }
            }
            Command::Subscribe {
                topic,
                callback,
                reply,
            } => {
                self.subscribe(topic, callback).await;
                let _ = reply.send(Ok(()));
            }
            Command::Unsubscribe { topic, reply } => {
                self.unsubscribe(&topic).await;
                let _ = reply.send(Ok(()));
            }
            Command::UnsubscribeAll { reply } => {
                self.unsubscribe_all().await;
                let _ = reply.send(Ok(()));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn connect(&mut self, reply: oneshot::Sender<Result<()>>) {
        if self.state().is_open() {
            let _ = reply.send(Ok(()));
            return;
        }

        self.manual_disconnect = false;
        self.connect_waiters.push(reply);

        // Join the attempt already under way, including one waiting out a backoff
        if self.state() == ConnectionState::Connecting || self.reconnect_timer.is_some() {
            debug!(waiters = self.connect_waiters.len(), "Connect joined in-flight attempt");
            return;
        }

        if self.policy.is_exhausted() {
            self.policy.reset();
        }
        self.start_attempt();
    }

    fn start_attempt(&mut self) {
        self.epoch += 1;
        let epoch = self.epoch;
        let endpoint = self.policy.current_endpoint().to_string();
        let connector = Arc::clone(&self.connector);
        let connect_timeout = self.config.connect_timeout;
        let link_tx = self.link_tx.clone();

        self.set_state(ConnectionState::Connecting);
        self.metrics.connect_attempts.inc();
        info!(
            endpoint = %endpoint,
            failures = self.policy.failures(),
            "Starting connect attempt"
        );

        self.attempt = Some(tokio::spawn(async move {
            let event = match timeout(connect_timeout, connector.connect(&endpoint)).await {
                Ok(Ok(link)) => LinkEvent::Established { epoch, link },
                Ok(Err(error)) => LinkEvent::Failed {
                    epoch,
                    endpoint,
                    error,
                },
                Err(_) => LinkEvent::Failed {
                    epoch,
                    endpoint,
                    error: StreamError::ConnectTimeout,
                },
            };
            let _ = link_tx.send(event);
        }));
    }

    async fn disconnect(&mut self) {
        info!("Disconnecting");
        let was_open = self.state().is_open();

        self.manual_disconnect = true;
        self.reconnect_timer = None;
        if self.sink.is_some() {
            self.set_state(ConnectionState::Closing);
        }
        self.teardown_link(true).await;
        self.set_state(ConnectionState::Disconnected);
        self.policy.reset();
        self.auth_token = None;
        self.balance_stream = false;

        let topics = self.subscriptions.clear();
        let queued = self.queue.fail_all(StreamError::Disconnected);
        let pending = self.correlator.fail_all(StreamError::Disconnected);
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(StreamError::Disconnected));
        }
        info!(topics, queued, pending, "Disconnected");

        if was_open {
            self.events.emit(ClientEvent::Disconnected);
        }
        self.update_gauges();
    }

    async fn force_reconnect(&mut self, reply: oneshot::Sender<Result<()>>) {
        info!("Forcing reconnect");
        let was_open = self.state().is_open();

        self.reconnect_timer = None;
        self.teardown_link(true).await;
        self.set_state(ConnectionState::Disconnected);
        if was_open {
            self.events.emit(ClientEvent::Disconnected);
            self.correlator.fail_all(StreamError::ConnectionLost);
            self.subscriptions.clear_requests();
        }

        self.manual_disconnect = false;
        self.policy.reset();
        self.connect_waiters.push(reply);
        self.start_attempt();
        self.update_gauges();
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Established { epoch, mut link } => {
                if epoch != self.epoch || self.state() != ConnectionState::Connecting {
                    debug!(epoch, "Closing connection from superseded attempt");
                    let _ = link.sink.close().await;
                    return;
                }
                self.on_open(link).await;
            }
            LinkEvent::Failed {
                epoch,
                endpoint,
                error,
            } => {
                if epoch != self.epoch {
                    return;
                }
                self.attempt = None;
                self.metrics.connect_failures.inc();
                warn!(endpoint = %endpoint, error = %error, "Connect attempt failed");

                self.set_state(ConnectionState::Disconnected);
                self.policy.advance_endpoint();
                self.events.emit(ClientEvent::Error(error));
                self.schedule_reconnect();
            }
            LinkEvent::Frame { epoch, text } => {
                if epoch == self.epoch {
                    self.route(&text).await;
                }
            }
            LinkEvent::Closed { epoch, reason } => {
                if epoch == self.epoch && self.sink.is_some() {
                    self.on_unexpected_close(reason).await;
                }
            }
        }
    }

    async fn on_open(&mut self, link: Link) {
        self.attempt = None;
        let Link { sink, source } = link;
        self.sink = Some(sink);
        self.reader = Some(tokio::spawn(read_frames(
            self.epoch,
            source,
            self.link_tx.clone(),
        )));

        self.set_state(ConnectionState::Open);
        self.metrics.connection_open.set(1);
        self.policy.reset();
        self.start_keepalive();
        info!(endpoint = %self.policy.current_endpoint(), "Connection open");

        self.replay_authorization().await;
        self.flush_queue().await;
        self.resubscribe_all().await;

        self.events.emit(ClientEvent::Connected);
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        self.update_gauges();
    }

    async fn on_unexpected_close(&mut self, reason: String) {
        warn!(reason = %reason, "Connection lost");

        self.teardown_link(false).await;
        self.set_state(ConnectionState::Disconnected);
        self.events.emit(ClientEvent::Disconnected);

        let failed = self.correlator.fail_all(StreamError::ConnectionLost);
        if failed > 0 {
            warn!(failed, "Failed outstanding requests on connection loss");
        }
        self.subscriptions.clear_requests();
        self.update_gauges();
        self.schedule_reconnect();
    }

    /// Drop the current transport, if any, and invalidate its tasks
    async fn teardown_link(&mut self, graceful: bool) {
        self.epoch += 1;
        self.keepalive = None;
        if let Some(attempt) = self.attempt.take() {
            attempt.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            if graceful {
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "Error while closing transport");
                }
            }
        }
        self.metrics.connection_open.set(0);
    }

    fn schedule_reconnect(&mut self) {
        if self.manual_disconnect {
            debug!("Reconnect suppressed by explicit disconnect");
            return;
        }

        match self.policy.record_failure() {
            Some(delay) => {
                info!(
                    attempt = self.policy.failures(),
                    delay_ms = delay.as_millis() as u64,
                    endpoint = %self.policy.current_endpoint(),
                    "Scheduling reconnect"
                );
                self.reconnect_timer = Some(Box::pin(sleep(delay)));
            }
            None => {
                let error = StreamError::ReconnectCeiling {
                    attempts: self.config.max_reconnect_attempts,
                };
                error!(error = %error, "Giving up on reconnection");
                self.reconnect_timer = None;
                self.events.emit(ClientEvent::Error(error.clone()));
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Err(error.clone()));
                }
            }
        }
    }

    fn start_keepalive(&mut self) {
        let period = self.config.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Replacing the slot drops any previous timer
        self.keepalive = Some(keepalive);
    }

    async fn send_keepalive(&mut self) {
        let frame = match requests::encode(&requests::ping(), None) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to encode keepalive");
                return;
            }
        };

        match self.write(frame).await {
            Ok(()) => trace!("Keepalive sent"),
            Err(e) => {
                warn!(error = %e, "Keepalive send failed");
                self.on_unexpected_close(format!("keepalive send failed: {}", e))
                    .await;
            }
        }
    }

    async fn shutdown(&mut self) {
        self.manual_disconnect = true;
        self.reconnect_timer = None;
        self.teardown_link(true).await;
        self.set_state(ConnectionState::Disconnected);

        self.queue.fail_all(StreamError::ClientClosed);
        self.correlator.fail_all(StreamError::ClientClosed);
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(StreamError::ClientClosed));
        }
        info!("Connection manager stopped");
    }

    async fn write(&mut self, frame: String) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(StreamError::ConnectionLost)?;
        sink.send(frame).await?;
        self.metrics.frames_sent.inc();
        Ok(())
    }

    async fn submit(&mut self, request: RequestCommand) {
        let RequestCommand {
            req_id,
            payload,
            kind,
            timeout,
            reply,
        } = request;

        let frame = match requests::encode(&payload, Some(req_id)) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let request = QueuedRequest {
            req_id,
            frame,
            kind,
            timeout,
            reply: Some(reply),
        };

        if self.state().is_open() {
            if let Err((request, error)) = self.transmit(request).await {
                warn!(req_id, error = %error, "Failed to send request");
                if let Some(reply) = request.reply {
                    let _ = reply.send(Err(error));
                }
            }
        } else {
            debug!(req_id, state = %self.state(), "Queueing request until connection opens");
            self.queue.push(request);
        }
        self.update_gauges();
    }

    /// Write a request and start waiting for its reply
    ///
    /// On failure the request is handed back untouched.
    async fn transmit(
        &mut self,
        request: QueuedRequest,
    ) -> std::result::Result<(), (QueuedRequest, StreamError)> {
        match self.write(request.frame.clone()).await {
            Ok(()) => {
                debug!(req_id = request.req_id, "Request sent");
                self.correlator.insert(
                    request.req_id,
                    request.kind,
                    request.timeout,
                    request.reply,
                );
                Ok(())
            }
            Err(error) => Err((request, error)),
        }
    }

    async fn flush_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        info!(count = self.queue.len(), "Flushing queued requests");

        while let Some(request) = self.queue.pop() {
            if let Err((request, error)) = self.transmit(request).await {
                warn!(
                    req_id = request.req_id,
                    error = %error,
                    "Flush interrupted, keeping remaining requests queued"
                );
                self.queue.requeue_front(request);
                break;
            }
        }
    }

    async fn replay_authorization(&mut self) {
        let Some(token) = self.auth_token.clone() else {
            return;
        };

        let req_id = self.ids.next_id();
        let frame = match requests::encode(&requests::authorize(&token), Some(req_id)) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to encode authorization replay");
                return;
            }
        };

        info!(req_id, "Replaying authorization after reconnect");
        let request = QueuedRequest {
            req_id,
            frame,
            kind: RequestKind::Reauthorize { token },
            timeout: self.config.request_timeout,
            reply: None,
        };
        if let Err((_, error)) = self.transmit(request).await {
            warn!(error = %error, "Failed to replay authorization");
        }
    }

    /// Subscribe to balance changes again on a fresh, re-authorized link
    async fn restore_balance_stream(&mut self) {
        let req_id = self.ids.next_id();
        let frame = match requests::encode(&requests::balance(), Some(req_id)) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to encode balance subscription");
                return;
            }
        };

        info!(req_id, "Restoring balance stream after reconnect");
        let request = QueuedRequest {
            req_id,
            frame,
            kind: RequestKind::Balance,
            timeout: self.config.request_timeout,
            reply: None,
        };
        if let Err((_, error)) = self.transmit(request).await {
            warn!(error = %error, "Failed to restore balance stream");
        }
    }

    async fn subscribe(&mut self, topic: String, callback: TopicCallback) {
        if !self.subscriptions.subscribe(&topic, callback) {
            debug!(topic = %topic, "Replaced subscription callback");
            return;
        }
        if !self.state().is_open() {
            debug!(topic = %topic, "Subscription recorded, sent once connected");
            return;
        }
        if let Err(e) = self.send_subscribe(&topic).await {
            warn!(topic = %topic, error = %e, "Subscribe not sent, will retry on reconnect");
        }
    }

    async fn send_subscribe(&mut self, topic: &str) -> Result<()> {
        let req_id = self.ids.next_id();
        let frame = requests::encode(&requests::ticks_subscribe(topic), Some(req_id))?;
        self.write(frame).await?;
        self.subscriptions.record_request(req_id, topic);
        debug!(topic = %topic, req_id, "Subscribe sent");
        Ok(())
    }

    /// Remove one topic
    ///
    /// The service can only forget every tick stream at once, so the
    /// remaining topics are subscribed again right after.
    async fn unsubscribe(&mut self, topic: &str) {
        if !self.subscriptions.unsubscribe(topic) {
            return;
        }
        if !self.state().is_open() {
            return;
        }

        if let Err(e) = self.send_forget_all().await {
            warn!(topic = %topic, error = %e, "Forget-all not sent");
            return;
        }
        for sibling in self.subscriptions.topics() {
            if let Err(e) = self.send_subscribe(&sibling).await {
                warn!(topic = %sibling, error = %e, "Failed to restore sibling subscription");
                return;
            }
        }
        debug!(topic = %topic, remaining = self.subscriptions.len(), "Unsubscribed");
    }

    async fn unsubscribe_all(&mut self) {
        let removed = self.subscriptions.clear();
        if removed > 0 && self.state().is_open() {
            if let Err(e) = self.send_forget_all().await {
                warn!(error = %e, "Forget-all not sent");
            }
        }
        debug!(removed, "Unsubscribed from every topic");
    }

    async fn send_forget_all(&mut self) -> Result<()> {
        let frame = requests::encode(&requests::forget_all_ticks(), Some(self.ids.next_id()))?;
        self.write(frame).await?;
        self.subscriptions.clear_requests();
        Ok(())
    }

    async fn resubscribe_all(&mut self) {
        self.subscriptions.clear_requests();
        let topics = self.subscriptions.topics();
        if topics.is_empty() {
            return;
        }

        info!(count = topics.len(), "Restoring subscriptions");
        for topic in topics {
            if let Err(e) = self.send_subscribe(&topic).await {
                warn!(topic = %topic, error = %e, "Failed to restore subscription");
                break;
            }
        }
    }

    async fn route(&mut self, text: &str) {
        self.metrics.frames_received.inc();

        let frame = match Inbound::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping unparsable frame");
                return;
            }
        };

        if let Some(req_id) = frame.req_id {
            if self.correlator.contains(req_id) {
                self.complete_request(req_id, frame).await;
                return;
            }
            if let Some(error) = &frame.error {
                match self.subscriptions.reject(req_id, error.clone()) {
                    Some(topic) => {
                        warn!(topic = %topic, code = %error.code, "Subscription rejected")
                    }
                    None => warn!(
                        req_id,
                        code = %error.code,
                        message = %error.message,
                        "Service error for a request no longer tracked"
                    ),
                }
                return;
            }
        }

        if let Some(error) = &frame.error {
            warn!(code = %error.code, message = %error.message, "Uncorrelated service error");
            return;
        }

        match frame.msg_type.as_str() {
            "tick" => match frame.tick() {
                Ok(tick) => {
                    let topic = tick.symbol.clone();
                    if !self.subscriptions.dispatch(tick) {
                        self.metrics.pushes_dropped.inc();
                        debug!(topic = %topic, "No subscriber for tick, dropping");
                    }
                }
                Err(e) => warn!(error = %e, "Malformed tick frame"),
            },
            "balance" => match frame.balance() {
                Ok(balance) => self.events.emit(ClientEvent::BalanceChanged(balance)),
                Err(e) => warn!(error = %e, "Malformed balance frame"),
            },
            "ping" => trace!("Keepalive reply"),
            other => debug!(msg_type = %other, req_id = ?frame.req_id, "Unrouted frame"),
        }
    }

    async fn complete_request(&mut self, req_id: u64, frame: Inbound) {
        let failure = frame.error.clone();
        let account = frame.field::<Account>("authorize").ok();
        let balance = if frame.msg_type == "balance" {
            frame.balance().ok()
        } else {
            None
        };

        let Some(kind) = self.correlator.resolve(req_id, frame.into_outcome()) else {
            return;
        };
        debug!(req_id, ok = failure.is_none(), "Reply matched");

        match kind {
            RequestKind::Authorize { token } => {
                if failure.is_none() {
                    if let Some(account) = account {
                        info!(loginid = %account.loginid, "Authorized");
                        self.auth_token = Some(token);
                        self.events.emit(ClientEvent::Authenticated(Some(account)));
                    }
                }
            }
            RequestKind::Reauthorize { .. } => match (failure, account) {
                (None, Some(account)) => {
                    info!(loginid = %account.loginid, "Re-authorized after reconnect");
                    self.events.emit(ClientEvent::Authenticated(Some(account)));
                    if self.balance_stream {
                        self.restore_balance_stream().await;
                    }
                }
                (Some(error), _) => {
                    warn!(code = %error.code, "Authorization replay rejected");
                    self.auth_token = None;
                    self.balance_stream = false;
                    self.events.emit(ClientEvent::Authenticated(None));
                    self.events.emit(ClientEvent::Error(error.into()));
                }
                (None, None) => warn!("Authorization replay reply carried no account"),
            },
            RequestKind::Logout => {
                if failure.is_none() {
                    info!("Logged out");
                    self.auth_token = None;
                    self.balance_stream = false;
                    self.events.emit(ClientEvent::Authenticated(None));
                }
            }
            RequestKind::Balance => {
                if let Some(balance) = balance {
                    self.balance_stream = true;
                    self.events.emit(ClientEvent::BalanceChanged(balance));
                }
            }
            RequestKind::Generic | RequestKind::History | RequestKind::Order => {}
        }
        self.update_gauges();
    }

    fn update_gauges(&self) {
        self.metrics.pending_requests.set(self.correlator.len() as i64);
        self.metrics.queued_requests.set(self.queue.len() as i64);
    }

    fn stats(&self) -> ManagerStats {
        ManagerStats {
            state: self.state(),
            pending_requests: self.correlator.len(),
            queued_requests: self.queue.len(),
            pending_ids: self.correlator.ids(),
            topics: self.subscriptions.topics(),
            reconnect_failures: self.policy.failures(),
            endpoint: self.policy.current_endpoint().to_string(),
            authenticated: self.auth_token.is_some(),
            balance_stream: self.balance_stream,
        }
    }
}

/// Forward frames from one transport to the manager until it closes
async fn read_frames(
    epoch: u64,
    mut source: Box<dyn FrameSource>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
) {
    let reason = loop {
        match source.next().await {
            Some(Ok(text)) => {
                if link_tx.send(LinkEvent::Frame { epoch, text }).is_err() {
                    return;
                }
            }
            Some(Err(e)) => break e.to_string(),
            None => break "transport closed".to_string(),
        }
    };
    let _ = link_tx.send(LinkEvent::Closed { epoch, reason });
}

async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(delay) => delay.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn wait_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
