//! Ephemeral viewer counter. Redis-backed in production, a plain map
//! in tests. Counts are approximate by design and never negative.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::AppResult;

fn presence_key(broadcast_id: Uuid) -> String {
    format!("presence:{broadcast_id}")
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Returns the count after the join.
    async fn join(&self, broadcast_id: Uuid) -> AppResult<i64>;
    /// Returns the count after the leave, floored at zero.
    async fn leave(&self, broadcast_id: Uuid) -> AppResult<i64>;
    async fn current(&self, broadcast_id: Uuid) -> AppResult<i64>;
    async fn reset(&self, broadcast_id: Uuid) -> AppResult<()>;
}

pub struct RedisPresenceStore {
    manager: ConnectionManager,
}

impl RedisPresenceStore {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn join(&self, broadcast_id: Uuid) -> AppResult<i64> {
        let mut conn = self.manager.clone();
        let count: i64 = redis::cmd("INCR")
            .arg(presence_key(broadcast_id))
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn leave(&self, broadcast_id: Uuid) -> AppResult<i64> {
        let mut conn = self.manager.clone();
        let key = presence_key(broadcast_id);
        let count: i64 = redis::cmd("DECR").arg(&key).query_async(&mut conn).await?;
        if count < 0 {
            // A leave without a matching join (e.g. after a reset).
            redis::cmd("SET")
                .arg(&key)
                .arg(0)
                .query_async::<_, ()>(&mut conn)
                .await?;
            return Ok(0);
        }
        Ok(count)
    }

    async fn current(&self, broadcast_id: Uuid) -> AppResult<i64> {
        let mut conn = self.manager.clone();
        let count: Option<i64> = redis::cmd("GET")
            .arg(presence_key(broadcast_id))
            .query_async(&mut conn)
            .await?;
        Ok(count.unwrap_or(0).max(0))
    }

    async fn reset(&self, broadcast_id: Uuid) -> AppResult<()> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(presence_key(broadcast_id))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPresenceStore {
    counts: Mutex<HashMap<Uuid, i64>>,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn join(&self, broadcast_id: Uuid) -> AppResult<i64> {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(broadcast_id).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn leave(&self, broadcast_id: Uuid) -> AppResult<i64> {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(broadcast_id).or_insert(0);
        *count = (*count - 1).max(0);
        Ok(*count)
    }

    async fn current(&self, broadcast_id: Uuid) -> AppResult<i64> {
        Ok(self
            .counts
            .lock()
            .unwrap()
            .get(&broadcast_id)
            .copied()
            .unwrap_or(0))
    }

    async fn reset(&self, broadcast_id: Uuid) -> AppResult<()> {
        self.counts.lock().unwrap().remove(&broadcast_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn leave_floors_at_zero() {
        let store = MemoryPresenceStore::new();
        let bid = Uuid::new_v4();

        assert_eq!(store.leave(bid).await.unwrap(), 0);
        assert_eq!(store.join(bid).await.unwrap(), 1);
        assert_eq!(store.join(bid).await.unwrap(), 2);
        assert_eq!(store.leave(bid).await.unwrap(), 1);
        assert_eq!(store.leave(bid).await.unwrap(), 0);
        assert_eq!(store.leave(bid).await.unwrap(), 0);
        assert_eq!(store.current(bid).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reset_clears_count() {
        let store = MemoryPresenceStore::new();
        let bid = Uuid::new_v4();

        store.join(bid).await.unwrap();
        store.join(bid).await.unwrap();
        store.reset(bid).await.unwrap();
        assert_eq!(store.current(bid).await.unwrap(), 0);
    }
}
