//! Append-only per-broadcast timeline event log.
//!
//! Events are immutable once inserted. The store assigns `created_at`
//! and a monotonically increasing `seq`, so concurrent appends for one
//! broadcast serialize into a single total order even when the
//! caller-supplied `timestamp_ms` is not monotonic (manual corrections
//! are allowed). Readers sort by `timestamp_ms` for display but rely on
//! `(created_at, seq)` order for reconnect catch-up.
//!
//! A `UNIQUE (broadcast_id, idempotency_key)` constraint is the last
//! line of defense behind the idempotency guard: two writers that both
//! slip past a failed-open guard still cannot store the same intent
//! twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod payload;
pub mod postgres;

pub use memory::MemoryTimelineStore;
pub use payload::{
    CloseReason, EventKind, EventPayload, ModAction, PayloadError, PinAction, ProductSnapshot,
    SlideDirection,
};
pub use postgres::PostgresTimelineStore;

/// An immutable timeline record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: Uuid,
    pub broadcast_id: Uuid,
    /// Type tag + type-specific data, serialized as
    /// `"type": ..., "payload": ...` at this struct's level.
    #[serde(flatten)]
    pub payload: EventPayload,
    /// Milliseconds since the broadcast's actual start; 0 if the
    /// broadcast had not started when the event was created.
    pub timestamp_ms: i64,
    /// Acting user, or `None` for system-initiated events.
    pub created_by: Option<Uuid>,
    pub idempotency_key: String,
    /// Store-assigned insertion sequence, monotonic per store.
    pub seq: i64,
    /// Store-assigned wall clock; callers never supply this.
    pub created_at: DateTime<Utc>,
}

impl TimelineEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Input for an append; the store fills in id, seq, and created_at.
#[derive(Debug, Clone)]
pub struct NewTimelineEvent {
    pub broadcast_id: Uuid,
    pub payload: EventPayload,
    pub timestamp_ms: i64,
    pub created_by: Option<Uuid>,
    pub idempotency_key: String,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An event with this `(broadcast_id, idempotency_key)` already
    /// exists. Callers resolve by fetching the stored event.
    #[error("idempotency key already recorded for this broadcast")]
    DuplicateKey,

    #[error("stored payload is corrupt: {0}")]
    Payload(#[from] PayloadError),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            if db_err.is_unique_violation() {
                return StoreError::DuplicateKey;
            }
        }
        StoreError::Database(e.to_string())
    }
}

/// Append-only event log, queryable per broadcast.
#[async_trait]
pub trait TimelineStore: Send + Sync {
    /// Persist a new event. Fails with [`StoreError::DuplicateKey`] if
    /// the `(broadcast_id, idempotency_key)` pair is already stored.
    async fn insert(&self, event: NewTimelineEvent) -> StoreResult<TimelineEvent>;

    /// Look up the event stored for a given intent key.
    async fn find_by_key(
        &self,
        broadcast_id: Uuid,
        idempotency_key: &str,
    ) -> StoreResult<Option<TimelineEvent>>;

    /// Point lookup by event id.
    async fn get(&self, event_id: Uuid) -> StoreResult<Option<TimelineEvent>>;

    /// Display order: `timestamp_ms` ascending, `seq` as tie-break.
    async fn list(&self, broadcast_id: Uuid, limit: i64, offset: i64)
        -> StoreResult<Vec<TimelineEvent>>;

    /// Catch-up order: everything inserted strictly after the
    /// reference event, in insertion order. Falls back to the full
    /// display-ordered log when the reference is unknown.
    async fn list_since(
        &self,
        broadcast_id: Uuid,
        since_event_id: Uuid,
    ) -> StoreResult<Vec<TimelineEvent>>;

    /// Ordered projection of a single event kind (chapters).
    async fn list_by_kind(
        &self,
        broadcast_id: Uuid,
        kind: EventKind,
    ) -> StoreResult<Vec<TimelineEvent>>;
}
