//! Cross-instance fan-out.
//!
//! Local delivery goes through the [`RoomRegistry`]; when Redis is
//! configured, every push is also published on
//! `bcast:{broadcast_id}:{channel}` so sibling instances can deliver
//! to their own sockets. Published frames carry the origin instance id
//! and the listener skips its own frames, so a message is delivered to
//! each socket exactly once.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Channel, PushMessage, RoomRegistry};
use crate::redis_client::RedisClient;

fn channel_key(broadcast_id: Uuid, channel: Channel) -> String {
    format!("bcast:{broadcast_id}:{}", channel.as_str())
}

const PATTERN: &str = "bcast:*";

#[derive(Serialize, Deserialize)]
struct WireFrame {
    origin: Uuid,
    broadcast_id: Uuid,
    channel: Channel,
    message: PushMessage,
}

#[derive(Clone)]
pub struct FanoutHub {
    registry: RoomRegistry,
    redis: Option<RedisClient>,
    instance_id: Uuid,
}

impl FanoutHub {
    pub fn new(registry: RoomRegistry, redis: Option<RedisClient>) -> Self {
        Self {
            registry,
            redis,
            instance_id: Uuid::new_v4(),
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Local delivery plus cross-instance publish.
    pub async fn broadcast(&self, broadcast_id: Uuid, channel: Channel, msg: PushMessage) {
        self.registry.broadcast(broadcast_id, channel, &msg).await;

        if let Some(redis) = &self.redis {
            let frame = WireFrame {
                origin: self.instance_id,
                broadcast_id,
                channel,
                message: msg,
            };
            let Ok(payload) = serde_json::to_string(&frame) else {
                return;
            };
            let mut conn = redis.manager();
            if let Err(e) = redis::cmd("PUBLISH")
                .arg(channel_key(broadcast_id, channel))
                .arg(payload)
                .query_async::<_, ()>(&mut conn)
                .await
            {
                tracing::warn!(error = %e, %broadcast_id, "cross-instance publish failed");
            }
        }
    }

    pub async fn broadcast_to_user(&self, broadcast_id: Uuid, user_id: Uuid, msg: &PushMessage) {
        // User-targeted pushes stay local to this instance's sockets.
        self.registry
            .broadcast_to_user(broadcast_id, user_id, msg)
            .await;
    }

    /// Long-running psubscribe loop delivering sibling frames into the
    /// local registry. Spawned once from `main`.
    pub async fn run_listener(self, redis: RedisClient) {
        loop {
            let mut pubsub = match redis.pubsub().await {
                Ok(ps) => ps,
                Err(e) => {
                    tracing::warn!(error = %e, "pubsub connect failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                    continue;
                }
            };
            if let Err(e) = pubsub.psubscribe(PATTERN).await {
                tracing::warn!(error = %e, "psubscribe failed, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                continue;
            }
            tracing::info!(instance = %self.instance_id, "cross-instance listener started");

            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                let frame: WireFrame = match serde_json::from_str(&payload) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::debug!(error = %e, "dropping malformed fanout frame");
                        continue;
                    }
                };
                if frame.origin == self.instance_id {
                    continue;
                }
                self.registry
                    .broadcast(frame.broadcast_id, frame.channel, &frame.message)
                    .await;
            }
            tracing::warn!("pubsub stream ended, reconnecting");
        }
    }
}
