//! Lifecycle event fan-out
//!
//! Two delivery paths for the same events:
//! - single-slot handlers (`on_open`, `on_close`, ...), where registering a
//!   new handler replaces the previous one;
//! - a broadcast channel any number of listeners can subscribe to.
//!
//! A handler registered for "connected" while the connection is already open
//! fires immediately.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::StreamError;
use crate::parser::{Account, Balance};

/// Coarse client lifecycle events
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Error(StreamError),
    /// Identity after authorization, `None` after logout or failed re-auth
    Authenticated(Option<Account>),
    BalanceChanged(Balance),
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Connected => EventKind::Connected,
            ClientEvent::Disconnected => EventKind::Disconnected,
            ClientEvent::Error(_) => EventKind::Error,
            ClientEvent::Authenticated(_) => EventKind::Authenticated,
            ClientEvent::BalanceChanged(_) => EventKind::BalanceChanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Error,
    Authenticated,
    BalanceChanged,
}

pub type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

#[derive(Default)]
struct Slots {
    /// Mirrors whether the last lifecycle event was `Connected`
    open: bool,
    on_open: Option<Handler<()>>,
    on_close: Option<Handler<()>>,
    on_error: Option<Handler<StreamError>>,
    on_authenticated: Option<Handler<Option<Account>>>,
    on_balance: Option<Handler<Balance>>,
}

/// Event fan-out shared by a client and its connection manager
pub struct EventFanout {
    slots: Mutex<Slots>,
    tx: broadcast::Sender<ClientEvent>,
}

impl EventFanout {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            slots: Mutex::new(Slots::default()),
            tx,
        }
    }

    /// Deliver an event to its slot handler and to every broadcast listener
    ///
    /// Handlers run after the slot lock is released, so they may register
    /// other handlers.
    pub fn emit(&self, event: ClientEvent) {
        {
            let mut slots = self.slots.lock();
            match &event {
                ClientEvent::Connected => {
                    slots.open = true;
                    let handler = slots.on_open.clone();
                    drop(slots);
                    if let Some(handler) = handler {
                        handler(());
                    }
                }
                ClientEvent::Disconnected => {
                    slots.open = false;
                    let handler = slots.on_close.clone();
                    drop(slots);
                    if let Some(handler) = handler {
                        handler(());
                    }
                }
                ClientEvent::Error(error) => {
                    let handler = slots.on_error.clone();
                    drop(slots);
                    if let Some(handler) = handler {
                        handler(error.clone());
                    }
                }
                ClientEvent::Authenticated(account) => {
                    let handler = slots.on_authenticated.clone();
                    drop(slots);
                    if let Some(handler) = handler {
                        handler(account.clone());
                    }
                }
                ClientEvent::BalanceChanged(balance) => {
                    let handler = slots.on_balance.clone();
                    drop(slots);
                    if let Some(handler) = handler {
                        handler(balance.clone());
                    }
                }
            }
        }

        // No receivers is not an error
        let _ = self.tx.send(event);
    }

    /// Register the "connected" handler, firing it now if already open
    pub fn set_on_open(&self, handler: Handler<()>) {
        let fire_now = {
            let mut slots = self.slots.lock();
            slots.on_open = Some(Arc::clone(&handler));
            slots.open
        };
        if fire_now {
            handler(());
        }
    }

    pub fn set_on_close(&self, handler: Handler<()>) {
        self.slots.lock().on_close = Some(handler);
    }

    pub fn set_on_error(&self, handler: Handler<StreamError>) {
        self.slots.lock().on_error = Some(handler);
    }

    pub fn set_on_authenticated(&self, handler: Handler<Option<Account>>) {
        self.slots.lock().on_authenticated = Some(handler);
    }

    pub fn set_on_balance(&self, handler: Handler<Balance>) {
        self.slots.lock().on_balance = Some(handler);
    }

    /// New broadcast listener; sees events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Handler<()>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let handler: Handler<()> = Arc::new(move |()| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    #[test]
    fn test_new_handler_replaces_previous() {
        let fanout = EventFanout::new(8);
        let (first, h1) = counter();
        let (second, h2) = counter();

        fanout.set_on_close(h1);
        fanout.set_on_close(h2);
        fanout.emit(ClientEvent::Disconnected);

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_open_handler_fires_immediately() {
        let fanout = EventFanout::new(8);
        fanout.emit(ClientEvent::Connected);

        let (count, handler) = counter();
        fanout.set_on_open(handler);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Not re-fired after the connection drops
        fanout.emit(ClientEvent::Disconnected);
        let (after_close, handler) = counter();
        fanout.set_on_open(handler);
        assert_eq!(after_close.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_open_handler_fires_once_per_connect() {
        let fanout = EventFanout::new(8);
        let (count, handler) = counter();
        fanout.set_on_open(handler);
        fanout.emit(ClientEvent::Connected);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_listener() {
        let fanout = EventFanout::new(8);
        let mut a = fanout.subscribe();
        let mut b = fanout.subscribe();
        assert_eq!(fanout.listener_count(), 2);

        let balance = Balance {
            balance: dec!(1000),
            currency: "USD".to_string(),
            loginid: None,
        };
        fanout.emit(ClientEvent::BalanceChanged(balance.clone()));

        assert_eq!(
            a.recv().await.unwrap(),
            ClientEvent::BalanceChanged(balance.clone())
        );
        assert_eq!(b.recv().await.unwrap(), ClientEvent::BalanceChanged(balance));
    }

    #[test]
    fn test_authenticated_handler_sees_logout() {
        let fanout = EventFanout::new(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        fanout.set_on_authenticated(Arc::new(move |account: Option<Account>| {
            log.lock().push(account.map(|a| a.loginid));
        }));

        fanout.emit(ClientEvent::Authenticated(None));
        assert_eq!(*seen.lock(), vec![None]);
        assert_eq!(ClientEvent::Authenticated(None).kind(), EventKind::Authenticated);
    }
}
