//! Viewer presence. Every join/leave pushes the fresh count to the
//! `presence` room so overlays update without polling.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppResult;
use crate::store::PresenceStore;
use crate::websocket::{Channel, FanoutHub, PushBody, PushMessage};

pub struct PresenceService {
    store: Arc<dyn PresenceStore>,
    hub: FanoutHub,
}

impl PresenceService {
    pub fn new(store: Arc<dyn PresenceStore>, hub: FanoutHub) -> Self {
        Self { store, hub }
    }

    pub async fn join(&self, broadcast_id: Uuid) -> AppResult<i64> {
        let count = self.store.join(broadcast_id).await?;
        self.push_count(broadcast_id, count).await;
        Ok(count)
    }

    pub async fn leave(&self, broadcast_id: Uuid) -> AppResult<i64> {
        let count = self.store.leave(broadcast_id).await?;
        self.push_count(broadcast_id, count).await;
        Ok(count)
    }

    pub async fn current(&self, broadcast_id: Uuid) -> AppResult<i64> {
        self.store.current(broadcast_id).await
    }

    /// Clears the counter when a broadcast ends.
    pub async fn reset(&self, broadcast_id: Uuid) -> AppResult<()> {
        self.store.reset(broadcast_id).await?;
        self.push_count(broadcast_id, 0).await;
        Ok(())
    }

    async fn push_count(&self, broadcast_id: Uuid, count: i64) {
        self.hub
            .broadcast(
                broadcast_id,
                Channel::Presence,
                PushMessage::new(Channel::Presence, PushBody::ViewerCount { count }),
            )
            .await;
    }
}
