//! Offer lifecycle orchestration.
//!
//! The store enforces the transitions atomically; this layer adds the
//! host checks, idempotency, timeline announcements, and the sold-out
//! close that rides on the winning claim.

use chrono::Utc;
use idempotency::{scope_key, Admission, IdempotencyGuard, Policy};
use std::sync::Arc;
use timeline_store::{CloseReason, EventPayload, ProductSnapshot};
use uuid::Uuid;

use crate::collab::{BroadcastDirectory, OrderLedger};
use crate::error::{AppError, AppResult};
use crate::models::{ClaimOutcome, NewOffer, Offer, OfferStatus};
use crate::services::timeline::TimelineService;
use crate::store::OfferStore;

pub struct OfferService {
    store: Arc<dyn OfferStore>,
    guard: IdempotencyGuard,
    directory: Arc<dyn BroadcastDirectory>,
    orders: Arc<dyn OrderLedger>,
    timeline: Arc<TimelineService>,
}

impl OfferService {
    pub fn new(
        store: Arc<dyn OfferStore>,
        guard: IdempotencyGuard,
        directory: Arc<dyn BroadcastDirectory>,
        orders: Arc<dyn OrderLedger>,
        timeline: Arc<TimelineService>,
    ) -> Self {
        Self {
            store,
            guard,
            directory,
            orders,
            timeline,
        }
    }

    pub async fn create(&self, host_id: Uuid, input: NewOffer) -> AppResult<Offer> {
        self.require_host(input.broadcast_id, host_id).await?;
        if input.offer_price < 0.0 {
            return Err(AppError::BadRequest("offer_price cannot be negative".into()));
        }
        if matches!(input.quantity_limit, Some(limit) if limit <= 0) {
            return Err(AppError::BadRequest(
                "quantity_limit must be positive".into(),
            ));
        }
        if matches!(input.time_limit_seconds, Some(s) if s <= 0) {
            return Err(AppError::BadRequest(
                "time_limit_seconds must be positive".into(),
            ));
        }
        let offer = self.store.create(input).await?;
        tracing::info!(offer_id = %offer.id, broadcast_id = %offer.broadcast_id, "offer created");
        Ok(offer)
    }

    pub async fn get(&self, offer_id: Uuid) -> AppResult<Offer> {
        self.store.get(offer_id).await?.ok_or(AppError::NotFound)
    }

    pub async fn list_for_broadcast(&self, broadcast_id: Uuid) -> AppResult<Vec<Offer>> {
        self.store.list_for_broadcast(broadcast_id).await
    }

    pub async fn find_active(&self, broadcast_id: Uuid) -> AppResult<Option<Offer>> {
        self.store.find_active(broadcast_id).await
    }

    /// Open an offer to viewers. Idempotent per caller key; replays
    /// return the current offer state without re-announcing.
    pub async fn open(
        &self,
        offer_id: Uuid,
        host_id: Uuid,
        idempotency_key: &str,
    ) -> AppResult<Offer> {
        let offer = self.get(offer_id).await?;
        self.require_host(offer.broadcast_id, host_id).await?;

        // Reject before admitting so a doomed transition does not
        // consume the caller's key; a retry must see the same 409.
        if offer.status == OfferStatus::Closed {
            return Err(AppError::Conflict("offer is already closed".into()));
        }

        let key = scope_key("offer_open", offer.broadcast_id, idempotency_key);
        if let Admission::Duplicate = self.guard.admit(&key, Policy::FailClosed).await? {
            return self.get(offer_id).await;
        }

        let now = Utc::now();
        let (offer, displaced) = self.store.activate(offer_id, now).await?;

        // Displaced offers get their own close events so the timeline
        // stays faithful to what viewers saw.
        for closed in &displaced {
            self.announce_close(closed, CloseReason::Manual, Some(host_id))
                .await?;
        }

        self.timeline
            .append(
                offer.broadcast_id,
                EventPayload::OfferOpen {
                    offer_id: offer.id,
                    title: offer.title.clone(),
                    description: offer.description.clone(),
                    price: offer.offer_price,
                    original_price: offer.original_price,
                    discount_percent: offer.discount_percent,
                    quantity_limit: offer.quantity_limit,
                    quantity_remaining: offer.quantity_remaining(),
                    time_limit_seconds: offer.time_limit_seconds,
                    product: ProductSnapshot {
                        id: offer.product_id,
                        name: offer.product_name.clone(),
                        image_url: offer.product_image_url.clone(),
                    },
                },
                Some(host_id),
                idempotency_key,
            )
            .await?;

        tracing::info!(
            offer_id = %offer.id,
            broadcast_id = %offer.broadcast_id,
            expires_at = ?offer.expires_at,
            "offer opened"
        );
        Ok(offer)
    }

    /// Close an offer. A close on an already-closed offer is a no-op
    /// returning the current state.
    pub async fn close(
        &self,
        offer_id: Uuid,
        host_id: Uuid,
        idempotency_key: &str,
    ) -> AppResult<Offer> {
        let offer = self.get(offer_id).await?;
        self.require_host(offer.broadcast_id, host_id).await?;

        let key = scope_key("offer_close", offer.broadcast_id, idempotency_key);
        if let Admission::Duplicate = self.guard.admit(&key, Policy::FailClosed).await? {
            return self.get(offer_id).await;
        }

        match self
            .store
            .close_if_active(offer_id, CloseReason::Manual, Utc::now())
            .await?
        {
            Some(closed) => {
                self.announce_close(&closed, CloseReason::Manual, Some(host_id))
                    .await?;
                Ok(closed)
            }
            None => self.get(offer_id).await,
        }
    }

    pub async fn pause(&self, offer_id: Uuid, host_id: Uuid) -> AppResult<Offer> {
        let offer = self.get(offer_id).await?;
        self.require_host(offer.broadcast_id, host_id).await?;
        let paused = self.store.pause(offer_id).await?;
        tracing::info!(offer_id = %paused.id, "offer paused");
        Ok(paused)
    }

    /// One purchase attempt from the payment flow. Whichever claim
    /// consumes the last unit also closes the offer, in the same call.
    pub async fn claim(&self, offer_id: Uuid) -> AppResult<ClaimOutcome> {
        let outcome = self.store.claim_one(offer_id).await?;

        if outcome.sold_out {
            if let Some(closed) = self
                .store
                .close_if_active(offer_id, CloseReason::SoldOut, Utc::now())
                .await?
            {
                self.announce_close(&closed, CloseReason::SoldOut, None)
                    .await?;
            }
        }
        Ok(outcome)
    }

    /// Close every offer whose window has elapsed. Returns how many
    /// were closed; races with manual closes resolve to no-ops.
    pub async fn sweep_expired(&self, now: chrono::DateTime<chrono::Utc>) -> AppResult<usize> {
        let due = self.store.due_expiries(now).await?;
        let mut closed_count = 0;
        for offer in due {
            match self
                .store
                .close_if_active(offer.id, CloseReason::Expired, now)
                .await
            {
                Ok(Some(closed)) => {
                    if let Err(e) = self.announce_close(&closed, CloseReason::Expired, None).await {
                        tracing::warn!(offer_id = %closed.id, error = %e, "expiry close announcement failed");
                    }
                    closed_count += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(offer_id = %offer.id, error = %e, "expiry close failed");
                }
            }
        }
        Ok(closed_count)
    }

    async fn announce_close(
        &self,
        offer: &Offer,
        reason: CloseReason,
        actor: Option<Uuid>,
    ) -> AppResult<()> {
        let revenue = self.orders.paid_revenue(offer.id).await;
        // System-initiated closes have no caller key; derive one from
        // the close time so retries after a crash dedup naturally.
        let key = format!(
            "close_{}_{}",
            offer.id,
            offer.closed_at.unwrap_or_else(Utc::now).timestamp_millis()
        );
        self.timeline
            .append(
                offer.broadcast_id,
                EventPayload::OfferClose {
                    offer_id: offer.id,
                    reason,
                    quantity_sold: offer.quantity_claimed,
                    revenue,
                },
                actor,
                &key,
            )
            .await?;
        tracing::info!(
            offer_id = %offer.id,
            reason = reason.as_str(),
            quantity_sold = offer.quantity_claimed,
            "offer closed"
        );
        Ok(())
    }

    async fn require_host(&self, broadcast_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let info = self
            .directory
            .get(broadcast_id)
            .await
            .ok_or(AppError::NotFound)?;
        if info.host_id != user_id {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }
}
