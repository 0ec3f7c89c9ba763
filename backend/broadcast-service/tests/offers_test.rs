mod common;

use common::TestEngine;
use futures::future::join_all;
use std::sync::Arc;
use timeline_store::{CloseReason, EventKind, EventPayload};
use uuid::Uuid;

use broadcast_service::models::{NewOffer, OfferStatus};

fn offer_input(broadcast_id: Uuid, quantity_limit: Option<i32>) -> NewOffer {
    NewOffer {
        broadcast_id,
        product_id: Uuid::new_v4(),
        product_name: "hoodie".into(),
        product_image_url: None,
        title: "flash hoodie".into(),
        description: Some("live only".into()),
        offer_price: 39.0,
        original_price: Some(59.0),
        discount_percent: Some(34),
        quantity_limit,
        time_limit_seconds: Some(300),
    }
}

#[tokio::test]
async fn open_announces_snapshot_on_the_timeline() {
    let engine = TestEngine::new();
    let (bid, host) = engine.live_broadcast();

    let offer = engine
        .offers
        .create(host, offer_input(bid, Some(10)))
        .await
        .unwrap();
    let opened = engine.offers.open(offer.id, host, "open-1").await.unwrap();

    assert_eq!(opened.status, OfferStatus::Active);
    assert!(opened.expires_at.is_some());

    let events = engine.timeline.list(bid, 100, 0).await.unwrap();
    assert_eq!(events.len(), 1);
    match &events[0].payload {
        EventPayload::OfferOpen {
            offer_id,
            quantity_remaining,
            product,
            ..
        } => {
            assert_eq!(*offer_id, offer.id);
            assert_eq!(*quantity_remaining, Some(10));
            assert_eq!(product.name, "hoodie");
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn repeated_open_with_same_key_is_idempotent() {
    let engine = TestEngine::new();
    let (bid, host) = engine.live_broadcast();

    let offer = engine
        .offers
        .create(host, offer_input(bid, None))
        .await
        .unwrap();
    engine.offers.open(offer.id, host, "open-1").await.unwrap();
    engine.offers.open(offer.id, host, "open-1").await.unwrap();

    let opens = engine.timeline.list(bid, 100, 0).await.unwrap();
    assert_eq!(opens.len(), 1, "one announcement for one intent");
}

#[tokio::test]
async fn at_most_one_active_offer_under_concurrent_opens() {
    let engine = Arc::new(TestEngine::new());
    let (bid, host) = engine.live_broadcast();

    let mut offer_ids = Vec::new();
    for _ in 0..5 {
        let offer = engine
            .offers
            .create(host, offer_input(bid, None))
            .await
            .unwrap();
        offer_ids.push(offer.id);
    }

    let tasks: Vec<_> = offer_ids
        .iter()
        .enumerate()
        .map(|(i, &offer_id)| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.offers.open(offer_id, host, &format!("open-{i}")).await })
        })
        .collect();
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let offers = engine.offers.list_for_broadcast(bid).await.unwrap();
    let active = offers
        .iter()
        .filter(|o| o.status == OfferStatus::Active)
        .count();
    assert_eq!(active, 1);

    let closed = offers
        .iter()
        .filter(|o| o.status == OfferStatus::Closed)
        .count();
    assert_eq!(closed, 4);
}

#[tokio::test]
async fn concurrent_claims_never_oversell_and_close_once() {
    let engine = Arc::new(TestEngine::new());
    let (bid, host) = engine.live_broadcast();

    let offer = engine
        .offers
        .create(host, offer_input(bid, Some(5)))
        .await
        .unwrap();
    engine.offers.open(offer.id, host, "open-1").await.unwrap();

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let engine = engine.clone();
            let offer_id = offer.id;
            tokio::spawn(async move { engine.offers.claim(offer_id).await })
        })
        .collect();

    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let successes = outcomes.iter().filter(|o| o.success).count();
    let sold_out_signals = outcomes.iter().filter(|o| o.sold_out).count();
    assert_eq!(successes, 5);
    assert_eq!(sold_out_signals, 1, "exactly one claimer triggers the close");

    let closed = engine.offers.get(offer.id).await.unwrap();
    assert_eq!(closed.status, OfferStatus::Closed);
    assert_eq!(closed.close_reason, Some(CloseReason::SoldOut));
    assert_eq!(closed.quantity_claimed, 5);

    let close_events = engine
        .timeline
        .list(bid, 100, 0)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind() == EventKind::OfferClose)
        .count();
    assert_eq!(close_events, 1, "a single close announcement");
}

#[tokio::test]
async fn close_reports_revenue_and_repeat_close_is_noop() {
    let engine = TestEngine::new();
    let (bid, host) = engine.live_broadcast();

    let offer = engine
        .offers
        .create(host, offer_input(bid, None))
        .await
        .unwrap();
    engine.offers.open(offer.id, host, "open-1").await.unwrap();
    engine.offers.claim(offer.id).await.unwrap();
    engine.offers.claim(offer.id).await.unwrap();
    engine.ledger.set_revenue(offer.id, 78.0);

    let closed = engine.offers.close(offer.id, host, "close-1").await.unwrap();
    assert_eq!(closed.status, OfferStatus::Closed);

    // Different key, already closed: no-op returning current state.
    let again = engine.offers.close(offer.id, host, "close-2").await.unwrap();
    assert_eq!(again.status, OfferStatus::Closed);
    assert_eq!(again.close_reason, Some(CloseReason::Manual));

    let events = engine.timeline.list(bid, 100, 0).await.unwrap();
    let closes: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::OfferClose {
                quantity_sold,
                revenue,
                reason,
                ..
            } => Some((*quantity_sold, *revenue, *reason)),
            _ => None,
        })
        .collect();
    assert_eq!(closes, vec![(2, 78.0, CloseReason::Manual)]);
}

#[tokio::test]
async fn expiry_sweep_closes_due_offers_once() {
    let engine = TestEngine::new();
    let (bid, host) = engine.live_broadcast();

    let offer = engine
        .offers
        .create(host, offer_input(bid, None))
        .await
        .unwrap();
    let opened = engine.offers.open(offer.id, host, "open-1").await.unwrap();
    let due_time = opened.expires_at.unwrap() + chrono::Duration::seconds(1);

    assert_eq!(engine.offers.sweep_expired(due_time).await.unwrap(), 1);
    // Second sweep finds nothing active.
    assert_eq!(engine.offers.sweep_expired(due_time).await.unwrap(), 0);

    let closed = engine.offers.get(offer.id).await.unwrap();
    assert_eq!(closed.status, OfferStatus::Closed);
    assert_eq!(closed.close_reason, Some(CloseReason::Expired));

    let close_events = engine
        .timeline
        .list(bid, 100, 0)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind() == EventKind::OfferClose)
        .count();
    assert_eq!(close_events, 1);
}

#[tokio::test]
async fn non_host_cannot_drive_the_lifecycle() {
    let engine = TestEngine::new();
    let (bid, host) = engine.live_broadcast();
    let stranger = Uuid::new_v4();

    let offer = engine
        .offers
        .create(host, offer_input(bid, None))
        .await
        .unwrap();

    assert_eq!(
        engine
            .offers
            .open(offer.id, stranger, "open-x")
            .await
            .unwrap_err()
            .status_code(),
        403
    );
    assert_eq!(
        engine
            .offers
            .create(stranger, offer_input(bid, None))
            .await
            .unwrap_err()
            .status_code(),
        403
    );
}

#[tokio::test]
async fn pause_and_reopen_keeps_claim_count() {
    let engine = TestEngine::new();
    let (bid, host) = engine.live_broadcast();

    let offer = engine
        .offers
        .create(host, offer_input(bid, Some(10)))
        .await
        .unwrap();
    engine.offers.open(offer.id, host, "open-1").await.unwrap();
    engine.offers.claim(offer.id).await.unwrap();

    let paused = engine.offers.pause(offer.id, host).await.unwrap();
    assert_eq!(paused.status, OfferStatus::Paused);

    // Claims bounce while paused.
    let outcome = engine.offers.claim(offer.id).await.unwrap();
    assert!(!outcome.success);

    let reopened = engine.offers.open(offer.id, host, "open-2").await.unwrap();
    assert_eq!(reopened.status, OfferStatus::Active);
    assert_eq!(reopened.quantity_claimed, 1);
}

#[tokio::test]
async fn reopening_a_closed_offer_conflicts_on_every_retry() {
    let engine = TestEngine::new();
    let (bid, host) = engine.live_broadcast();

    let offer = engine
        .offers
        .create(host, offer_input(bid, None))
        .await
        .unwrap();
    engine.offers.open(offer.id, host, "open-1").await.unwrap();
    engine.offers.close(offer.id, host, "close-1").await.unwrap();

    // The rejection must not consume the caller's key, so a retry of
    // the same request repeats the 409 instead of reporting success.
    for _ in 0..2 {
        assert_eq!(
            engine
                .offers
                .open(offer.id, host, "open-again")
                .await
                .unwrap_err()
                .status_code(),
            409
        );
    }
    let offer = engine.offers.get(offer.id).await.unwrap();
    assert_eq!(offer.status, OfferStatus::Closed);
}

#[tokio::test]
async fn rejected_claim_reports_real_remaining_quantity() {
    let engine = TestEngine::new();
    let (bid, host) = engine.live_broadcast();

    let offer = engine
        .offers
        .create(host, offer_input(bid, None))
        .await
        .unwrap();
    engine.offers.open(offer.id, host, "open-1").await.unwrap();
    engine.offers.claim(offer.id).await.unwrap();
    engine.offers.pause(offer.id, host).await.unwrap();

    // Unlimited stock: a bounced claim is about the paused state, not
    // the quantity, so remaining stays unbounded.
    let outcome = engine.offers.claim(offer.id).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.quantity_limit, None);
    assert_eq!(outcome.quantity_remaining, None);
    assert!(!outcome.sold_out);
}
