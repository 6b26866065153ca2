//! Topic subscription tests: replacement, bulk unsubscribe, resubscribe

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rust_decimal_macros::dec;
use serde_json::json;
use tokio::sync::mpsc;

use common::*;
use quote_stream::{StreamClient, TopicEvent};

fn client_for(connector: &ScriptedConnector) -> StreamClient {
    StreamClient::with_connector(test_config(&[ENDPOINT_A]), Arc::new(connector.clone())).unwrap()
}

fn forward(tx: mpsc::UnboundedSender<TopicEvent>) -> impl Fn(TopicEvent) + Send + Sync + 'static {
    move |event| {
        let _ = tx.send(event);
    }
}

#[tokio::test(start_paused = true)]
async fn test_second_subscribe_replaces_callback() {
    let (connector, mut sessions) = ScriptedConnector::new();
    let client = client_for(&connector);
    client.connect().await.unwrap();
    let mut server = next_session(&mut sessions).await;

    let first_calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&first_calls);
    client
        .subscribe("SYM1", move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
    let frame = server.next_frame().await;
    assert_eq!(frame["ticks"], "SYM1");
    assert_eq!(frame["subscribe"], 1);

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.subscribe("SYM1", forward(tx)).await.unwrap();

    server.push(tick("SYM1", 101.25));
    match rx.recv().await.unwrap() {
        TopicEvent::Tick(tick) => {
            assert_eq!(tick.symbol, "SYM1");
            assert_eq!(tick.quote, dec!(101.25));
        }
        other => panic!("Expected tick, got {:?}", other),
    }
    assert_eq!(first_calls.load(Ordering::SeqCst), 0);

    // The replacement did not send a second subscribe frame
    settle().await;
    assert!(server.drain().is_empty());
    assert_eq!(client.stats().await.unwrap().topics, vec!["SYM1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_resubscribes_siblings() {
    let (connector, mut sessions) = ScriptedConnector::new();
    let client = client_for(&connector);
    client.connect().await.unwrap();
    let mut server = next_session(&mut sessions).await;

    for topic in ["SYM1", "SYM2", "SYM3"] {
        client.subscribe(topic, |_| {}).await.unwrap();
        assert_eq!(server.next_frame().await["ticks"], topic);
    }

    client.unsubscribe("SYM2").await.unwrap();
    assert_eq!(server.next_frame().await["forget_all"], "ticks");
    assert_eq!(server.next_frame().await["ticks"], "SYM1");
    assert_eq!(server.next_frame().await["ticks"], "SYM3");

    // Pushes for the removed topic are dropped, not fatal
    server.push(tick("SYM2", 55.0));
    settle().await;
    assert_eq!(client.metrics().pushes_dropped.get(), 1);
    assert!(client.connection_status());
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_all_forgets_everything() {
    let (connector, mut sessions) = ScriptedConnector::new();
    let client = client_for(&connector);
    client.connect().await.unwrap();
    let mut server = next_session(&mut sessions).await;

    client.subscribe("SYM1", |_| {}).await.unwrap();
    client.subscribe("SYM2", |_| {}).await.unwrap();
    server.next_frame().await;
    server.next_frame().await;

    client.unsubscribe_all().await.unwrap();
    assert_eq!(server.next_frame().await["forget_all"], "ticks");
    settle().await;
    assert!(server.drain().is_empty());
    assert!(client.stats().await.unwrap().topics.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_topics_restored_after_reconnect() {
    let (connector, mut sessions) = ScriptedConnector::new();
    let client = client_for(&connector);

    // Recorded while offline, sent on the first open
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.subscribe("SYM1", forward(tx)).await.unwrap();

    client.connect().await.unwrap();
    let mut server = next_session(&mut sessions).await;
    assert_eq!(server.next_frame().await["ticks"], "SYM1");

    server.drop_connection();
    let mut server = next_session(&mut sessions).await;
    assert_eq!(server.next_frame().await["ticks"], "SYM1");

    server.push(tick("SYM1", 99.5));
    match rx.recv().await.unwrap() {
        TopicEvent::Tick(tick) => assert_eq!(tick.quote, dec!(99.5)),
        other => panic!("Expected tick, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rejected_subscription_reaches_its_callback() {
    let (connector, mut sessions) = ScriptedConnector::new();
    let client = client_for(&connector);
    client.connect().await.unwrap();
    let mut server = next_session(&mut sessions).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.subscribe("NOPE", forward(tx)).await.unwrap();
    let frame = server.next_frame().await;

    server.push(json!({
        "msg_type": "tick",
        "req_id": frame["req_id"].clone(),
        "error": { "code": "InvalidSymbol", "message": "Symbol NOPE is invalid." }
    }));

    match rx.recv().await.unwrap() {
        TopicEvent::Rejected(error) => assert_eq!(error.code, "InvalidSymbol"),
        other => panic!("Expected rejection, got {:?}", other),
    }
    assert!(client.stats().await.unwrap().topics.is_empty());
    assert!(client.connection_status());
}
