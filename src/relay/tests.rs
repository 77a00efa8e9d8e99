use super::{Message, Relay, ReplayBuffer};
use crate::auth::TokenVerifier;
use crate::connection::Connection;
use crate::transport::message::Batch;
use crate::utils::error::AuthError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tungstenite::protocol::Message as WsMessage;

/// Accepts "good", rejects "user" as lacking a role, errors on anything else.
struct StaticVerifier;

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<bool, AuthError> {
        match token {
            "good" => Ok(true),
            "user" => Ok(false),
            _ => Err(AuthError::Token(
                jsonwebtoken::errors::ErrorKind::InvalidToken.into(),
            )),
        }
    }
}

/// Accepts every token, but only once `gate` is notified.
struct GatedVerifier {
    gate: Arc<Notify>,
}

#[async_trait]
impl TokenVerifier for GatedVerifier {
    async fn verify(&self, _token: &str) -> Result<bool, AuthError> {
        self.gate.notified().await;
        Ok(true)
    }
}

fn relay(max: usize) -> Relay {
    Relay::new(max, Arc::new(StaticVerifier))
}

fn msg(topic: &str, payload: &str) -> Message {
    Message::new(topic, payload, 0)
}

fn connect(relay: &Relay) -> (Arc<Connection>, mpsc::Receiver<WsMessage>) {
    let (tx, rx) = mpsc::channel(64);
    (relay.register_connection(tx), rx)
}

fn authorized(relay: &Relay) -> (Arc<Connection>, mpsc::Receiver<WsMessage>) {
    let (connection, rx) = connect(relay);
    connection.authorize();
    (connection, rx)
}

fn next_batch(rx: &mut mpsc::Receiver<WsMessage>) -> Batch {
    match rx.try_recv().expect("expected a frame") {
        WsMessage::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("Expected a text message, got {other:?}"),
    }
}

fn payloads(relay: &Relay, topic: &str) -> Vec<String> {
    relay
        .buffered(topic)
        .iter()
        .map(|m| m.payload.clone())
        .collect()
}

#[test]
fn test_buffer_keeps_last_n_in_order() {
    let mut buffer = ReplayBuffer::new(3);
    for p in ["m1", "m2", "m3", "m4"] {
        buffer.push(Arc::new(msg("t", p)));
    }
    assert_eq!(buffer.len(), 3);
    let last: Vec<_> = buffer.last_n(2).iter().map(|m| m.payload.clone()).collect();
    assert_eq!(last, vec!["m3", "m4"]);
    assert_eq!(buffer.last_n(0).len(), 0);
}

#[test]
fn test_buffer_capacity_is_at_least_one() {
    let buffer = ReplayBuffer::new(0);
    assert_eq!(buffer.capacity(), 1);
    assert!(buffer.is_empty());
}

#[test]
fn test_buffer_evicts_oldest_and_snapshot_is_capped() {
    let relay = relay(3);
    for p in ["m1", "m2", "m3", "m4"] {
        relay.deliver(msg("t", p));
    }
    assert_eq!(payloads(&relay, "t"), vec!["m2", "m3", "m4"]);

    let (connection, mut rx) = authorized(&relay);
    assert_eq!(relay.subscribe(&connection, "t", 10), 3);

    let batch = next_batch(&mut rx);
    assert!(batch.full);
    assert_eq!(batch.topic, "t");
    assert_eq!(batch.messages, vec!["m2", "m3", "m4"]);
}

#[test]
fn test_subscribe_returns_min_of_count_and_buffered() {
    let relay = relay(100);
    for i in 0..5 {
        relay.deliver(msg("t", &format!("m{i}")));
    }
    let (connection, mut rx) = authorized(&relay);

    assert_eq!(relay.subscribe(&connection, "t", 2), 2);
    assert_eq!(next_batch(&mut rx).messages, vec!["m3", "m4"]);
}

#[test]
fn test_subscribe_to_empty_topic_sends_empty_snapshot() {
    let relay = relay(10);
    let (connection, mut rx) = authorized(&relay);

    assert_eq!(relay.subscribe(&connection, "nothing-yet", 20), 0);
    let batch = next_batch(&mut rx);
    assert!(batch.full);
    assert!(batch.messages.is_empty());
}

#[test]
fn test_subscribed_connection_receives_every_message_in_order() {
    let relay = relay(10);
    let (connection, mut rx) = authorized(&relay);
    relay.subscribe(&connection, "t", 0);
    next_batch(&mut rx);

    for i in 0..20 {
        relay.deliver(msg("t", &format!("m{i}")));
    }

    for i in 0..20 {
        let batch = next_batch(&mut rx);
        assert!(!batch.full);
        assert_eq!(batch.messages, vec![format!("m{i}")]);
    }
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_unauthorized_subscribe_sends_nothing() {
    let relay = relay(10);
    relay.deliver(msg("t", "m1"));
    let (connection, mut rx) = connect(&relay);

    assert_eq!(relay.subscribe(&connection, "t", 10), 0);
    assert_eq!(connection.topic().as_deref(), Some("t"));
    relay.deliver(msg("t", "m2"));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_late_authorization_is_not_retroactive() {
    let relay = relay(10);
    let (connection, mut rx) = connect(&relay);
    relay.subscribe(&connection, "t", 10);

    relay.deliver(msg("t", "during"));
    connection.authorize();
    relay.deliver(msg("t", "after"));

    assert_eq!(next_batch(&mut rx).messages, vec!["after"]);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_switching_topics_stops_old_deliveries() {
    let relay = relay(10);
    relay.deliver(msg("b", "b-backlog"));
    let (connection, mut rx) = authorized(&relay);

    relay.subscribe(&connection, "a", 0);
    next_batch(&mut rx);
    relay.deliver(msg("a", "a1"));
    assert_eq!(next_batch(&mut rx).messages, vec!["a1"]);

    relay.subscribe(&connection, "b", 0);
    let snapshot = next_batch(&mut rx);
    assert!(snapshot.full);
    assert!(snapshot.messages.is_empty());

    relay.deliver(msg("a", "a2"));
    relay.deliver(msg("b", "b1"));
    let batch = next_batch(&mut rx);
    assert_eq!(batch.topic, "b");
    assert_eq!(batch.messages, vec!["b1"]);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_two_connections_each_receive_once() {
    let relay = relay(10);
    let (first, mut rx1) = authorized(&relay);
    let (second, mut rx2) = authorized(&relay);
    relay.subscribe(&first, "t", 0);
    relay.subscribe(&second, "t", 0);
    next_batch(&mut rx1);
    next_batch(&mut rx2);

    relay.deliver(msg("t", "m4"));
    assert_eq!(relay.deliver(msg("t", "m5")), 2);

    for rx in [&mut rx1, &mut rx2] {
        assert_eq!(next_batch(rx).messages, vec!["m4"]);
        assert_eq!(next_batch(rx).messages, vec!["m5"]);
        assert!(rx.try_recv().is_err());
    }
}

#[test]
fn test_broken_connection_does_not_stop_fan_out() {
    let relay = relay(10);
    let (broken, broken_rx) = authorized(&relay);
    let (healthy, mut rx) = authorized(&relay);
    relay.subscribe(&broken, "t", 0);
    relay.subscribe(&healthy, "t", 0);
    next_batch(&mut rx);
    drop(broken_rx);

    assert_eq!(relay.deliver(msg("t", "m1")), 1);
    assert_eq!(next_batch(&mut rx).messages, vec!["m1"]);
}

#[test]
fn test_full_queue_only_drops_for_that_connection() {
    let relay = relay(10);
    let (tx, mut slow_rx) = mpsc::channel(1);
    let slow = relay.register_connection(tx);
    slow.authorize();
    let (fast, mut fast_rx) = authorized(&relay);
    relay.subscribe(&slow, "t", 0);
    relay.subscribe(&fast, "t", 0);
    next_batch(&mut fast_rx);

    // the slow queue is already holding its snapshot
    relay.deliver(msg("t", "m1"));
    assert_eq!(next_batch(&mut fast_rx).messages, vec!["m1"]);
    assert!(next_batch(&mut slow_rx).full);
    assert!(slow_rx.try_recv().is_err());
}

#[test]
fn test_unregister_twice_is_a_noop() {
    let relay = relay(10);
    let (connection, mut rx) = authorized(&relay);
    let (_other, _rx) = connect(&relay);
    assert_eq!(relay.connection_count(), 2);

    relay.unregister(&connection);
    relay.unregister(&connection);
    assert_eq!(relay.connection_count(), 1);
    assert!(connection.is_terminated());
    assert!(rx.blocking_recv().is_none());
}

#[test]
fn test_subscribe_after_unregister_sends_nothing() {
    let relay = relay(10);
    relay.deliver(msg("t", "m1"));
    let (connection, _rx) = authorized(&relay);
    relay.unregister(&connection);
    assert_eq!(relay.subscribe(&connection, "t", 10), 0);
    assert_eq!(relay.deliver(msg("t", "m2")), 0);
}

#[test]
fn test_shutdown_closes_every_connection() {
    let relay = relay(10);
    let (_a, mut rx_a) = authorized(&relay);
    let (_b, mut rx_b) = connect(&relay);
    assert_eq!(relay.authorized_count(), 1);

    relay.shutdown();
    assert_eq!(relay.connection_count(), 0);
    assert_eq!(relay.authorized_count(), 0);
    assert!(rx_a.blocking_recv().is_none());
    assert!(rx_b.blocking_recv().is_none());
}

#[tokio::test]
async fn test_good_credential_authorizes() {
    let relay = relay(10);
    let (connection, _rx) = connect(&relay);
    relay
        .handle_credential(&connection, "good".to_string())
        .await
        .unwrap();
    assert!(connection.is_authorized());
}

#[tokio::test]
async fn test_rejected_credential_stays_unauthorized() {
    let relay = relay(10);
    let (connection, mut rx) = connect(&relay);
    relay
        .handle_credential(&connection, "user".to_string())
        .await
        .unwrap();
    relay
        .handle_credential(&connection, "garbage".to_string())
        .await
        .unwrap();
    assert!(!connection.is_authorized());
    // silent deny
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_pending_verification_does_not_block_delivery() {
    let gate = Arc::new(Notify::new());
    let relay = Relay::new(10, Arc::new(GatedVerifier { gate: gate.clone() }));
    let (pending, mut pending_rx) = connect(&relay);
    let (ready, mut ready_rx) = authorized(&relay);
    relay.subscribe(&ready, "t", 0);
    next_batch(&mut ready_rx);

    let verification = relay.handle_credential(&pending, "good".to_string());
    relay.subscribe(&pending, "t", 0);
    relay.deliver(msg("t", "while-pending"));
    assert_eq!(next_batch(&mut ready_rx).messages, vec!["while-pending"]);

    gate.notify_one();
    verification.await.unwrap();
    assert!(pending.is_authorized());
    assert!(pending_rx.try_recv().is_err());

    relay.deliver(msg("t", "after"));
    assert_eq!(next_batch(&mut pending_rx).messages, vec!["after"]);
}

#[tokio::test]
async fn test_verification_completing_after_close_is_a_noop() {
    let gate = Arc::new(Notify::new());
    let relay = Relay::new(10, Arc::new(GatedVerifier { gate: gate.clone() }));
    let (connection, _rx) = connect(&relay);

    let verification = relay.handle_credential(&connection, "good".to_string());
    relay.unregister(&connection);
    gate.notify_one();
    verification.await.unwrap();

    assert!(!connection.is_authorized());
    assert_eq!(relay.connection_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribe_during_delivery_has_no_gap_or_duplicate() {
    const TOTAL: usize = 2000;
    let relay = Arc::new(Relay::new(TOTAL, Arc::new(StaticVerifier)));
    let (tx, mut rx) = mpsc::channel(TOTAL + 1);
    let connection = relay.register_connection(tx);
    connection.authorize();

    let producer = {
        let relay = relay.clone();
        tokio::spawn(async move {
            for i in 0..TOTAL {
                relay.deliver(msg("t", &i.to_string()));
                if i % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    tokio::task::yield_now().await;
    relay.subscribe(&connection, "t", TOTAL);
    producer.await.unwrap();

    let mut seen = Vec::new();
    while let Ok(WsMessage::Text(text)) = rx.try_recv() {
        let batch: Batch = serde_json::from_str(text.as_str()).unwrap();
        seen.extend(batch.messages.into_iter().map(|m| m.parse::<usize>().unwrap()));
    }

    // snapshot + live together must be exactly 0..TOTAL
    assert_eq!(seen, (0..TOTAL).collect::<Vec<_>>());
}
