//! The single append path for timeline events, plus convenience
//! producers for the common host actions.
//!
//! Order of operations is fixed: directory check, idempotency
//! admission, durable insert, then exactly one `timeline` room push.
//! The push is last so subscribers never see an event that failed to
//! persist.

use chrono::{Duration, Utc};
use idempotency::{scope_key, Admission, IdempotencyGuard, Policy};
use std::sync::Arc;
use timeline_store::{
    EventPayload, NewTimelineEvent, SlideDirection, StoreError, TimelineEvent, TimelineStore,
};
use uuid::Uuid;

use crate::collab::{BroadcastDirectory, BroadcastInfo};
use crate::error::{AppError, AppResult};
use crate::websocket::{Channel, FanoutHub, PushBody, PushMessage};

pub struct TimelineService {
    store: Arc<dyn TimelineStore>,
    guard: IdempotencyGuard,
    directory: Arc<dyn BroadcastDirectory>,
    hub: FanoutHub,
}

impl TimelineService {
    pub fn new(
        store: Arc<dyn TimelineStore>,
        guard: IdempotencyGuard,
        directory: Arc<dyn BroadcastDirectory>,
        hub: FanoutHub,
    ) -> Self {
        Self {
            store,
            guard,
            directory,
            hub,
        }
    }

    /// Append an event on behalf of the broadcast host. Rejects callers
    /// other than the host before any side effect.
    pub async fn append_from_host(
        &self,
        broadcast_id: Uuid,
        user_id: Uuid,
        payload: EventPayload,
        idempotency_key: &str,
        timestamp_ms: Option<i64>,
    ) -> AppResult<TimelineEvent> {
        let info = self.broadcast(broadcast_id).await?;
        if info.host_id != user_id {
            return Err(AppError::Forbidden);
        }
        self.append_with_info(&info, payload, Some(user_id), idempotency_key, timestamp_ms)
            .await
    }

    /// Append without a host check, for internal producers (offer
    /// lifecycle, order notifications, expiry sweeps).
    pub async fn append(
        &self,
        broadcast_id: Uuid,
        payload: EventPayload,
        created_by: Option<Uuid>,
        idempotency_key: &str,
    ) -> AppResult<TimelineEvent> {
        let info = self.broadcast(broadcast_id).await?;
        self.append_with_info(&info, payload, created_by, idempotency_key, None)
            .await
    }

    async fn append_with_info(
        &self,
        info: &BroadcastInfo,
        mut payload: EventPayload,
        created_by: Option<Uuid>,
        idempotency_key: &str,
        timestamp_ms: Option<i64>,
    ) -> AppResult<TimelineEvent> {
        let broadcast_id = info.id;
        let now = Utc::now();
        let timestamp_ms = timestamp_ms.unwrap_or_else(|| relative_ms(info));

        // Countdown deadlines are server time; never trust a client
        // supplied ends_at.
        if let EventPayload::CountdownStart {
            duration_seconds,
            ends_at,
            ..
        } = &mut payload
        {
            *ends_at = now + Duration::seconds(*duration_seconds);
        }

        let policy = if payload.kind().is_monetary() {
            Policy::FailClosed
        } else {
            Policy::FailOpen
        };
        let key = scope_key("timeline", broadcast_id, idempotency_key);

        if let Admission::Duplicate = self.guard.admit(&key, policy).await? {
            // Replay of a key we have already stored: return the
            // original without touching the log or the hub.
            if let Some(existing) = self.store.find_by_key(broadcast_id, idempotency_key).await? {
                return Ok(existing);
            }
            // Admitted once but never stored (crash between admit and
            // insert); fall through and write it now.
        }

        let event = match self
            .store
            .insert(NewTimelineEvent {
                broadcast_id,
                payload,
                timestamp_ms,
                created_by,
                idempotency_key: idempotency_key.to_string(),
            })
            .await
        {
            Ok(event) => event,
            // Two writers slipped past a failed-open guard; the unique
            // constraint picked the winner.
            Err(StoreError::DuplicateKey) => self
                .store
                .find_by_key(broadcast_id, idempotency_key)
                .await?
                .ok_or(AppError::Internal)?,
            Err(e) => return Err(e.into()),
        };

        let body = PushBody::TimelineEvent(
            serde_json::to_value(&event).map_err(|_| AppError::Internal)?,
        );
        self.hub
            .broadcast(
                broadcast_id,
                Channel::Timeline,
                PushMessage::new(Channel::Timeline, body),
            )
            .await;

        tracing::info!(
            %broadcast_id,
            event_type = event.kind().as_str(),
            timestamp_ms,
            "timeline event appended"
        );
        Ok(event)
    }

    pub async fn list(
        &self,
        broadcast_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<TimelineEvent>> {
        Ok(self.store.list(broadcast_id, limit, offset).await?)
    }

    pub async fn list_since(
        &self,
        broadcast_id: Uuid,
        since_event_id: Uuid,
    ) -> AppResult<Vec<TimelineEvent>> {
        Ok(self.store.list_since(broadcast_id, since_event_id).await?)
    }

    pub async fn chapters(&self, broadcast_id: Uuid) -> AppResult<Vec<TimelineEvent>> {
        Ok(self
            .store
            .list_by_kind(broadcast_id, timeline_store::EventKind::ChapterMark)
            .await?)
    }

    // Convenience producers for the common host actions. All funnel
    // through the single append path.

    pub async fn start_countdown(
        &self,
        broadcast_id: Uuid,
        host_id: Uuid,
        duration_seconds: i64,
        label: String,
        idempotency_key: &str,
    ) -> AppResult<TimelineEvent> {
        self.append_from_host(
            broadcast_id,
            host_id,
            EventPayload::CountdownStart {
                duration_seconds,
                label,
                // Overwritten in the append path.
                ends_at: Utc::now(),
            },
            idempotency_key,
            None,
        )
        .await
    }

    pub async fn mark_chapter(
        &self,
        broadcast_id: Uuid,
        host_id: Uuid,
        title: String,
        description: Option<String>,
        idempotency_key: &str,
    ) -> AppResult<TimelineEvent> {
        self.append_from_host(
            broadcast_id,
            host_id,
            EventPayload::ChapterMark { title, description },
            idempotency_key,
            None,
        )
        .await
    }

    pub async fn drop_link(
        &self,
        broadcast_id: Uuid,
        host_id: Uuid,
        title: String,
        url: String,
        idempotency_key: &str,
    ) -> AppResult<TimelineEvent> {
        self.append_from_host(
            broadcast_id,
            host_id,
            EventPayload::LinkDrop {
                title,
                url,
                description: None,
                thumbnail_url: None,
                requires_purchase: false,
                offer_id: None,
            },
            idempotency_key,
            None,
        )
        .await
    }

    pub async fn change_slide(
        &self,
        broadcast_id: Uuid,
        host_id: Uuid,
        presentation_id: Uuid,
        slide_index: i32,
        total_slides: i32,
        direction: SlideDirection,
        idempotency_key: &str,
    ) -> AppResult<TimelineEvent> {
        self.append_from_host(
            broadcast_id,
            host_id,
            EventPayload::SlideChange {
                presentation_id,
                slide_index,
                total_slides,
                direction,
            },
            idempotency_key,
            None,
        )
        .await
    }

    async fn broadcast(&self, broadcast_id: Uuid) -> AppResult<BroadcastInfo> {
        self.directory
            .get(broadcast_id)
            .await
            .ok_or(AppError::NotFound)
    }
}

/// Milliseconds elapsed since the broadcast went live; 0 before that.
pub fn relative_ms(info: &BroadcastInfo) -> i64 {
    match info.actual_start {
        Some(start) => (Utc::now() - start).num_milliseconds().max(0),
        None => 0,
    }
}
