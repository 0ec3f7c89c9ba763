//! In-memory store for tests and local development.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    EventKind, NewTimelineEvent, StoreError, StoreResult, TimelineEvent, TimelineStore,
};

#[derive(Default)]
pub struct MemoryTimelineStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    events: Vec<TimelineEvent>,
    next_seq: i64,
}

impl MemoryTimelineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TimelineStore for MemoryTimelineStore {
    async fn insert(&self, event: NewTimelineEvent) -> StoreResult<TimelineEvent> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner.events.iter().any(|e| {
            e.broadcast_id == event.broadcast_id && e.idempotency_key == event.idempotency_key
        });
        if duplicate {
            return Err(StoreError::DuplicateKey);
        }

        inner.next_seq += 1;
        let stored = TimelineEvent {
            id: Uuid::new_v4(),
            broadcast_id: event.broadcast_id,
            payload: event.payload,
            timestamp_ms: event.timestamp_ms,
            created_by: event.created_by,
            idempotency_key: event.idempotency_key,
            seq: inner.next_seq,
            created_at: Utc::now(),
        };
        inner.events.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_key(
        &self,
        broadcast_id: Uuid,
        idempotency_key: &str,
    ) -> StoreResult<Option<TimelineEvent>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .events
            .iter()
            .find(|e| e.broadcast_id == broadcast_id && e.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn get(&self, event_id: Uuid) -> StoreResult<Option<TimelineEvent>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.events.iter().find(|e| e.id == event_id).cloned())
    }

    async fn list(
        &self,
        broadcast_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<TimelineEvent>> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<TimelineEvent> = inner
            .events
            .iter()
            .filter(|e| e.broadcast_id == broadcast_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.timestamp_ms
                .cmp(&b.timestamp_ms)
                .then(a.seq.cmp(&b.seq))
        });
        Ok(events
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_since(
        &self,
        broadcast_id: Uuid,
        since_event_id: Uuid,
    ) -> StoreResult<Vec<TimelineEvent>> {
        // Lock scope must end before any await below.
        let ref_seq = {
            let inner = self.inner.lock().unwrap();
            inner
                .events
                .iter()
                .find(|e| e.id == since_event_id)
                .map(|e| e.seq)
        };
        match ref_seq {
            Some(ref_seq) => {
                let inner = self.inner.lock().unwrap();
                let mut events: Vec<TimelineEvent> = inner
                    .events
                    .iter()
                    .filter(|e| e.broadcast_id == broadcast_id && e.seq > ref_seq)
                    .cloned()
                    .collect();
                events.sort_by_key(|e| e.seq);
                Ok(events)
            }
            None => self.list(broadcast_id, i64::MAX, 0).await,
        }
    }

    async fn list_by_kind(
        &self,
        broadcast_id: Uuid,
        kind: EventKind,
    ) -> StoreResult<Vec<TimelineEvent>> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<TimelineEvent> = inner
            .events
            .iter()
            .filter(|e| e.broadcast_id == broadcast_id && e.kind() == kind)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.timestamp_ms
                .cmp(&b.timestamp_ms)
                .then(a.seq.cmp(&b.seq))
        });
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::EventPayload;

    fn link_event(broadcast_id: Uuid, key: &str, timestamp_ms: i64) -> NewTimelineEvent {
        NewTimelineEvent {
            broadcast_id,
            payload: EventPayload::LinkDrop {
                title: "example".into(),
                url: "https://example.com".into(),
                description: None,
                thumbnail_url: None,
                requires_purchase: false,
                offer_id: None,
            },
            timestamp_ms,
            created_by: None,
            idempotency_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_key_within_broadcast() {
        let store = MemoryTimelineStore::new();
        let bid = Uuid::new_v4();

        store.insert(link_event(bid, "k1", 10)).await.unwrap();
        let err = store.insert(link_event(bid, "k1", 20)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey));

        // Same key under a different broadcast is fine.
        store
            .insert(link_event(Uuid::new_v4(), "k1", 10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_orders_by_timestamp_then_seq() {
        let store = MemoryTimelineStore::new();
        let bid = Uuid::new_v4();

        let late = store.insert(link_event(bid, "a", 500)).await.unwrap();
        let early = store.insert(link_event(bid, "b", 100)).await.unwrap();
        let tied = store.insert(link_event(bid, "c", 100)).await.unwrap();

        let events = store.list(bid, 100, 0).await.unwrap();
        let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![early.id, tied.id, late.id]);
    }

    #[tokio::test]
    async fn list_since_returns_insertion_order() {
        let store = MemoryTimelineStore::new();
        let bid = Uuid::new_v4();

        let first = store.insert(link_event(bid, "a", 900)).await.unwrap();
        // Inserted later but stamped earlier; catch-up must still
        // deliver it, in insertion order.
        let backdated = store.insert(link_event(bid, "b", 100)).await.unwrap();
        let third = store.insert(link_event(bid, "c", 950)).await.unwrap();

        let events = store.list_since(bid, first.id).await.unwrap();
        let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![backdated.id, third.id]);
    }

    // Store futures cross task boundaries in the service layer, so
    // they must stay Send even on the fallback path that re-reads the
    // full log.
    #[tokio::test]
    async fn list_since_is_usable_from_a_spawned_task() {
        let store = std::sync::Arc::new(MemoryTimelineStore::new());
        let bid = Uuid::new_v4();

        let first = store.insert(link_event(bid, "a", 10)).await.unwrap();
        store.insert(link_event(bid, "b", 20)).await.unwrap();

        let known = {
            let store = store.clone();
            tokio::spawn(async move { store.list_since(bid, first.id).await })
        };
        let unknown = {
            let store = store.clone();
            tokio::spawn(async move { store.list_since(bid, Uuid::new_v4()).await })
        };
        assert_eq!(known.await.unwrap().unwrap().len(), 1);
        assert_eq!(unknown.await.unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_since_unknown_reference_falls_back_to_full_log() {
        let store = MemoryTimelineStore::new();
        let bid = Uuid::new_v4();

        store.insert(link_event(bid, "a", 10)).await.unwrap();
        store.insert(link_event(bid, "b", 20)).await.unwrap();

        let events = store.list_since(bid, Uuid::new_v4()).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn list_by_kind_projects_single_kind() {
        let store = MemoryTimelineStore::new();
        let bid = Uuid::new_v4();

        store.insert(link_event(bid, "a", 10)).await.unwrap();
        store
            .insert(NewTimelineEvent {
                broadcast_id: bid,
                payload: EventPayload::ChapterMark {
                    title: "intro".into(),
                    description: None,
                },
                timestamp_ms: 20,
                created_by: None,
                idempotency_key: "ch1".into(),
            })
            .await
            .unwrap();

        let chapters = store.list_by_kind(bid, EventKind::ChapterMark).await.unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].kind(), EventKind::ChapterMark);
    }
}
