//! Push-only live chat. Messages are fanned out, never stored; a
//! viewer who reconnects starts from the live stream.

use async_trait::async_trait;
use chrono::Utc;
use idempotency::{scope_key, Admission, IdempotencyGuard, Policy};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use timeline_store::{EventPayload, ModAction, PinAction};
use uuid::Uuid;

use crate::collab::{BroadcastDirectory, Identity, Role};
use crate::error::{AppError, AppResult};
use crate::services::timeline::TimelineService;
use crate::websocket::{Channel, FanoutHub, PushBody, PushMessage};

const MAX_MESSAGE_LEN: usize = 500;

/// Sliding-window message throttle per (user, broadcast).
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Returns whether this send is within the window's allowance.
    async fn check(&self, broadcast_id: Uuid, user_id: Uuid) -> AppResult<bool>;
}

pub struct RedisRateLimiter {
    manager: ConnectionManager,
    max_per_window: u32,
    window: Duration,
}

impl RedisRateLimiter {
    pub fn new(manager: ConnectionManager, max_per_window: u32, window: Duration) -> Self {
        Self {
            manager,
            max_per_window,
            window,
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, broadcast_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let key = format!("chat_rate:{broadcast_id}:{user_id}");
        let mut conn = self.manager.clone();
        let count: u32 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(self.window.as_secs())
                .query_async::<_, ()>(&mut conn)
                .await?;
        }
        Ok(count <= self.max_per_window)
    }
}

pub struct MemoryRateLimiter {
    windows: Mutex<HashMap<(Uuid, Uuid), (Instant, u32)>>,
    max_per_window: u32,
    window: Duration,
}

impl MemoryRateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_per_window,
            window,
        }
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, broadcast_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let mut windows = self.windows.lock().unwrap();
        let now = Instant::now();
        let entry = windows.entry((broadcast_id, user_id)).or_insert((now, 0));
        if now.duration_since(entry.0) > self.window {
            *entry = (now, 0);
        }
        entry.1 += 1;
        Ok(entry.1 <= self.max_per_window)
    }
}

pub struct ChatService {
    guard: IdempotencyGuard,
    directory: Arc<dyn BroadcastDirectory>,
    limiter: Arc<dyn RateLimiter>,
    timeline: Arc<TimelineService>,
    hub: FanoutHub,
}

impl ChatService {
    pub fn new(
        guard: IdempotencyGuard,
        directory: Arc<dyn BroadcastDirectory>,
        limiter: Arc<dyn RateLimiter>,
        timeline: Arc<TimelineService>,
        hub: FanoutHub,
    ) -> Self {
        Self {
            guard,
            directory,
            limiter,
            timeline,
            hub,
        }
    }

    /// Fan a chat message out to the room. Returns the message id,
    /// which is deterministic per idempotency key so a retried send
    /// cannot appear twice.
    pub async fn send(
        &self,
        broadcast_id: Uuid,
        sender: &Identity,
        content: &str,
        idempotency_key: &str,
    ) -> AppResult<Uuid> {
        let info = self
            .directory
            .get(broadcast_id)
            .await
            .ok_or(AppError::NotFound)?;
        if !info.chat_enabled {
            return Err(AppError::Forbidden);
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("message cannot be empty".into()));
        }
        if content.len() > MAX_MESSAGE_LEN {
            return Err(AppError::BadRequest(format!(
                "message too long (max {MAX_MESSAGE_LEN} characters)"
            )));
        }

        if !self.limiter.check(broadcast_id, sender.user_id).await? {
            return Err(AppError::RateLimited);
        }

        let key = scope_key("chat", broadcast_id, idempotency_key);
        let message_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes());
        if let Admission::Duplicate = self.guard.admit(&key, Policy::FailOpen).await? {
            return Ok(message_id);
        }

        self.hub
            .broadcast(
                broadcast_id,
                Channel::Chat,
                PushMessage::new(
                    Channel::Chat,
                    PushBody::ChatMessage {
                        message_id,
                        user_id: sender.user_id,
                        display_name: sender.display_name.clone(),
                        content: content.to_string(),
                        sent_at: Utc::now(),
                    },
                ),
            )
            .await;
        Ok(message_id)
    }

    /// Host/moderator removal. Recorded on the timeline and pushed to
    /// current viewers.
    pub async fn delete_message(
        &self,
        broadcast_id: Uuid,
        moderator: &Identity,
        message_id: Uuid,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.require_moderator(broadcast_id, moderator).await?;

        self.timeline
            .append(
                broadcast_id,
                EventPayload::ChatModAction {
                    message_id,
                    action: ModAction::Delete,
                    moderator_id: moderator.user_id,
                    reason,
                },
                Some(moderator.user_id),
                &format!("chat_delete_{message_id}"),
            )
            .await?;

        self.hub
            .broadcast(
                broadcast_id,
                Channel::Chat,
                PushMessage::new(Channel::Chat, PushBody::ChatDelete { message_id }),
            )
            .await;
        Ok(())
    }

    pub async fn pin_message(
        &self,
        broadcast_id: Uuid,
        moderator: &Identity,
        message_id: Uuid,
        content: Option<String>,
        pinned: bool,
    ) -> AppResult<()> {
        self.require_moderator(broadcast_id, moderator).await?;

        let action = if pinned {
            PinAction::Pin
        } else {
            PinAction::Unpin
        };
        self.timeline
            .append(
                broadcast_id,
                EventPayload::PinMessage {
                    message_id,
                    action,
                    content: content.clone(),
                },
                Some(moderator.user_id),
                &format!("chat_pin_{message_id}_{}", pinned),
            )
            .await?;

        self.hub
            .broadcast(
                broadcast_id,
                Channel::Chat,
                PushMessage::new(
                    Channel::Chat,
                    PushBody::ChatPin {
                        message_id,
                        pinned,
                        content,
                    },
                ),
            )
            .await;
        Ok(())
    }

    async fn require_moderator(&self, broadcast_id: Uuid, identity: &Identity) -> AppResult<()> {
        let info = self
            .directory
            .get(broadcast_id)
            .await
            .ok_or(AppError::NotFound)?;
        let allowed = info.host_id == identity.user_id
            || matches!(identity.role, Role::Host | Role::Moderator);
        if !allowed {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limiter_allows_up_to_max_then_rejects() {
        let limiter = MemoryRateLimiter::new(3, Duration::from_secs(30));
        let bid = Uuid::new_v4();
        let user = Uuid::new_v4();

        for _ in 0..3 {
            assert!(limiter.check(bid, user).await.unwrap());
        }
        assert!(!limiter.check(bid, user).await.unwrap());

        // A different user has their own window.
        assert!(limiter.check(bid, Uuid::new_v4()).await.unwrap());
    }
}
