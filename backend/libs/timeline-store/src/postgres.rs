//! PostgreSQL-backed timeline store.
//!
//! `seq` is a `BIGSERIAL` and `created_at` defaults to `NOW()`, both
//! assigned inside the insert statement, so ordering never depends on
//! caller clocks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::payload::EventPayload;
use crate::{EventKind, NewTimelineEvent, StoreResult, TimelineEvent, TimelineStore};

const SELECT_COLUMNS: &str = "id, broadcast_id, event_type, payload, timestamp_ms, \
                              created_by, idempotency_key, seq, created_at";

pub struct PostgresTimelineStore {
    pool: PgPool,
}

impl PostgresTimelineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TimelineStore for PostgresTimelineStore {
    async fn insert(&self, event: NewTimelineEvent) -> StoreResult<TimelineEvent> {
        let (kind, payload_json) = event.payload.to_parts()?;

        let row: EventRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO timeline_events
                (id, broadcast_id, event_type, payload, timestamp_ms, created_by, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(event.broadcast_id)
        .bind(kind.as_str())
        .bind(&payload_json)
        .bind(event.timestamp_ms)
        .bind(event.created_by)
        .bind(&event.idempotency_key)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_by_key(
        &self,
        broadcast_id: Uuid,
        idempotency_key: &str,
    ) -> StoreResult<Option<TimelineEvent>> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM timeline_events \
             WHERE broadcast_id = $1 AND idempotency_key = $2"
        ))
        .bind(broadcast_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get(&self, event_id: Uuid) -> StoreResult<Option<TimelineEvent>> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM timeline_events WHERE id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(
        &self,
        broadcast_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<TimelineEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM timeline_events \
             WHERE broadcast_id = $1 \
             ORDER BY timestamp_ms ASC, seq ASC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(broadcast_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_since(
        &self,
        broadcast_id: Uuid,
        since_event_id: Uuid,
    ) -> StoreResult<Vec<TimelineEvent>> {
        let reference: Option<(DateTime<Utc>, i64)> =
            sqlx::query_as("SELECT created_at, seq FROM timeline_events WHERE id = $1")
                .bind(since_event_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((created_at, seq)) = reference else {
            // Unknown reference; hand the client the whole log.
            return self.list(broadcast_id, i64::MAX, 0).await;
        };

        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM timeline_events \
             WHERE broadcast_id = $1 AND (created_at, seq) > ($2, $3) \
             ORDER BY created_at ASC, seq ASC"
        ))
        .bind(broadcast_id)
        .bind(created_at)
        .bind(seq)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_kind(
        &self,
        broadcast_id: Uuid,
        kind: EventKind,
    ) -> StoreResult<Vec<TimelineEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM timeline_events \
             WHERE broadcast_id = $1 AND event_type = $2 \
             ORDER BY timestamp_ms ASC, seq ASC"
        ))
        .bind(broadcast_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    broadcast_id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    timestamp_ms: i64,
    created_by: Option<Uuid>,
    idempotency_key: String,
    seq: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for TimelineEvent {
    type Error = crate::StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let payload = EventPayload::from_parts(&row.event_type, row.payload)?;
        Ok(TimelineEvent {
            id: row.id,
            broadcast_id: row.broadcast_id,
            payload,
            timestamp_ms: row.timestamp_ms,
            created_by: row.created_by,
            idempotency_key: row.idempotency_key,
            seq: row.seq,
            created_at: row.created_at,
        })
    }
}
