mod common;

use broadcast_service::collab::{BroadcastInfo, BroadcastStatus, Identity, Role};
use broadcast_service::websocket::{Channel, RoomRegistry};
use chrono::Utc;
use common::TestEngine;
use serde_json::Value;
use uuid::Uuid;

async fn subscribe_chat(engine: &TestEngine, broadcast_id: Uuid) -> tokio::sync::mpsc::UnboundedReceiver<String> {
    let (id, tx, rx) = RoomRegistry::open_connection();
    engine
        .registry
        .subscribe(broadcast_id, Channel::Chat, id, None, tx)
        .await;
    rx
}

#[tokio::test]
async fn duplicate_send_fans_out_once_with_stable_id() {
    let engine = TestEngine::new();
    let (bid, _host) = engine.live_broadcast();
    let viewer = engine.viewer();
    let mut rx = subscribe_chat(&engine, bid).await;

    let first = engine
        .chat
        .send(bid, &viewer, "anyone got a size chart?", "msg-1")
        .await
        .unwrap();
    let second = engine
        .chat
        .send(bid, &viewer, "anyone got a size chart?", "msg-1")
        .await
        .unwrap();
    assert_eq!(first, second, "retries resolve to the same message id");

    let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(frame["type"], "CHAT_MESSAGE");
    assert_eq!(frame["channel"], "chat");
    assert!(rx.try_recv().is_err(), "no second fan-out for the retry");
}

#[tokio::test]
async fn rate_limit_rejects_after_ten_in_window() {
    let engine = TestEngine::new();
    let (bid, _host) = engine.live_broadcast();
    let viewer = engine.viewer();

    for i in 0..10 {
        engine
            .chat
            .send(bid, &viewer, "spam", &format!("k-{i}"))
            .await
            .unwrap();
    }
    let err = engine
        .chat
        .send(bid, &viewer, "spam", "k-10")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 429);
}

#[tokio::test]
async fn chat_disabled_broadcast_rejects_sends() {
    let engine = TestEngine::new();
    let bid = Uuid::new_v4();
    engine.directory.upsert(BroadcastInfo {
        id: bid,
        host_id: Uuid::new_v4(),
        status: BroadcastStatus::Live,
        actual_start: Some(Utc::now()),
        actual_end: None,
        chat_enabled: false,
        replay_offers_enabled: false,
    });

    let err = engine
        .chat
        .send(bid, &engine.viewer(), "hello", "k1")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn moderation_requires_privilege_and_is_recorded() {
    let engine = TestEngine::new();
    let (bid, host) = engine.live_broadcast();
    let mut rx = subscribe_chat(&engine, bid).await;

    let host_identity = Identity {
        user_id: host,
        role: Role::Host,
        display_name: "host".into(),
    };
    let message_id = Uuid::new_v4();

    engine
        .chat
        .delete_message(bid, &host_identity, message_id, Some("off topic".into()))
        .await
        .unwrap();

    let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(frame["type"], "CHAT_DELETE");

    // The removal is part of the permanent record.
    let events = engine.timeline.list(bid, 100, 0).await.unwrap();
    assert_eq!(events.len(), 1);

    let err = engine
        .chat
        .delete_message(bid, &engine.viewer(), Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn pin_pushes_and_appends_timeline_event() {
    let engine = TestEngine::new();
    let (bid, host) = engine.live_broadcast();
    let mut rx = subscribe_chat(&engine, bid).await;

    let host_identity = Identity {
        user_id: host,
        role: Role::Host,
        display_name: "host".into(),
    };
    let message_id = Uuid::new_v4();

    engine
        .chat
        .pin_message(bid, &host_identity, message_id, Some("use code LIVE10".into()), true)
        .await
        .unwrap();

    let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(frame["type"], "CHAT_PIN");
    assert_eq!(frame["data"]["pinned"], true);

    let events = engine.timeline.list(bid, 100, 0).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind().as_str(), "PIN_MESSAGE");
}
