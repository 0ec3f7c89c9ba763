//! End-to-end pass over a live broadcast: subscribers watch the rooms
//! while the host drives offers, viewers claim, presence moves, and an
//! order progresses.

mod common;

use broadcast_service::models::NewOffer;
use broadcast_service::services::{OrderStatus, OrderUpdate};
use broadcast_service::websocket::{Channel, RoomRegistry};
use common::TestEngine;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

struct Viewer {
    timeline: UnboundedReceiver<String>,
    presence: UnboundedReceiver<String>,
    orders: UnboundedReceiver<String>,
}

async fn connect_viewer(engine: &TestEngine, bid: Uuid, user_id: Option<Uuid>) -> Viewer {
    let (id, tx, rx_timeline) = RoomRegistry::open_connection();
    engine
        .registry
        .subscribe(bid, Channel::Timeline, id, user_id, tx)
        .await;
    let (id2, tx2, rx_presence) = RoomRegistry::open_connection();
    engine
        .registry
        .subscribe(bid, Channel::Presence, id2, user_id, tx2)
        .await;
    let (id3, tx3, rx_orders) = RoomRegistry::open_connection();
    engine
        .registry
        .subscribe(bid, Channel::Orders, id3, user_id, tx3)
        .await;
    Viewer {
        timeline: rx_timeline,
        presence: rx_presence,
        orders: rx_orders,
    }
}

fn next_frame(rx: &mut UnboundedReceiver<String>) -> Value {
    serde_json::from_str(&rx.try_recv().expect("expected a frame")).unwrap()
}

#[tokio::test]
async fn full_broadcast_flow() {
    let engine = TestEngine::new();
    let (bid, host) = engine.live_broadcast();
    let buyer_id = Uuid::new_v4();
    let mut viewer = connect_viewer(&engine, bid, Some(buyer_id)).await;

    // Presence: two joins, one leave.
    assert_eq!(engine.presence.join(bid).await.unwrap(), 1);
    assert_eq!(engine.presence.join(bid).await.unwrap(), 2);
    assert_eq!(engine.presence.leave(bid).await.unwrap(), 1);

    for expected in [1, 2, 1] {
        let frame = next_frame(&mut viewer.presence);
        assert_eq!(frame["type"], "VIEWER_COUNT");
        assert_eq!(frame["data"]["count"], expected);
    }

    // Host opens a two-unit offer; the open is announced exactly once
    // even when the request is retried with the same key.
    let offer = engine
        .offers
        .create(
            host,
            NewOffer {
                broadcast_id: bid,
                product_id: Uuid::new_v4(),
                product_name: "poster".into(),
                product_image_url: None,
                title: "signed poster".into(),
                description: None,
                offer_price: 15.0,
                original_price: None,
                discount_percent: None,
                quantity_limit: Some(2),
                time_limit_seconds: None,
            },
        )
        .await
        .unwrap();
    engine.offers.open(offer.id, host, "k1").await.unwrap();
    engine.offers.open(offer.id, host, "k1").await.unwrap();

    let open_frame = next_frame(&mut viewer.timeline);
    assert_eq!(open_frame["type"], "TIMELINE_EVENT");
    assert_eq!(open_frame["data"]["type"], "OFFER_OPEN");
    assert!(
        viewer.timeline.try_recv().is_err(),
        "retried open is not re-announced"
    );

    // Two claims sell out the offer; the second closes it.
    engine.ledger.set_revenue(offer.id, 30.0);
    let first = engine.offers.claim(offer.id).await.unwrap();
    assert!(first.success && !first.sold_out);
    let second = engine.offers.claim(offer.id).await.unwrap();
    assert!(second.success && second.sold_out);

    let rejected = engine.offers.claim(offer.id).await.unwrap();
    assert!(!rejected.success);
    assert_eq!(rejected.quantity_remaining, Some(0));

    let close_frame = next_frame(&mut viewer.timeline);
    assert_eq!(close_frame["data"]["type"], "OFFER_CLOSE");
    assert_eq!(close_frame["data"]["payload"]["reason"], "sold_out");
    assert_eq!(close_frame["data"]["payload"]["quantity_sold"], 2);
    assert_eq!(close_frame["data"]["payload"]["revenue"], 30.0);

    // The buyer's order progresses; only their connections hear it.
    let order_id = Uuid::new_v4();
    engine
        .order_notifier
        .notify(
            bid,
            OrderUpdate {
                order_id,
                user_id: buyer_id,
                offer_id: offer.id,
                status: OrderStatus::Paid,
                amount: 15.0,
                failure_reason: None,
                idempotency_key: format!("order_{order_id}_paid"),
            },
        )
        .await
        .unwrap();

    // The order event also lands on the public timeline.
    let order_event = next_frame(&mut viewer.timeline);
    assert_eq!(order_event["data"]["type"], "ORDER_PAID");

    let private = next_frame(&mut viewer.orders);
    assert_eq!(private["type"], "ORDER_UPDATE");
    assert_eq!(private["data"]["status"], "paid");

    // An anonymous connection on the orders channel hears nothing.
    let mut anon = connect_viewer(&engine, bid, None).await;
    engine
        .order_notifier
        .notify(
            bid,
            OrderUpdate {
                order_id: Uuid::new_v4(),
                user_id: buyer_id,
                offer_id: offer.id,
                status: OrderStatus::Created,
                amount: 15.0,
                failure_reason: None,
                idempotency_key: "order_2_created".into(),
            },
        )
        .await
        .unwrap();
    assert!(anon.orders.try_recv().is_err());

    // Reconnect catch-up: everything after the open, in insertion order.
    let events = engine.timeline.list(bid, 100, 0).await.unwrap();
    let open_id = events[0].id;
    let caught_up = engine.timeline.list_since(bid, open_id).await.unwrap();
    let kinds: Vec<&str> = caught_up.iter().map(|e| e.kind().as_str()).collect();
    assert_eq!(kinds, vec!["OFFER_CLOSE", "ORDER_PAID", "ORDER_CREATED"]);
}
