use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod fanout;
pub mod messages;
pub mod session;

pub use fanout::FanoutHub;
pub use messages::{ClientFrame, PushBody, PushMessage};

/// Sub-channel within a broadcast room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Timeline,
    Chat,
    Presence,
    Orders,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Timeline => "timeline",
            Channel::Chat => "chat",
            Channel::Presence => "presence",
            Channel::Orders => "orders",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "timeline" => Some(Channel::Timeline),
            "chat" => Some(Channel::Chat),
            "presence" => Some(Channel::Presence),
            "orders" => Some(Channel::Orders),
            _ => None,
        }
    }
}

/// Unique id per WebSocket connection, used for precise cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    id: SubscriberId,
    user_id: Option<Uuid>,
    sender: UnboundedSender<String>,
}

/// Tracks which connections subscribe to which `(broadcast, channel)`
/// room. Dead senders are pruned on send.
#[derive(Default, Clone)]
pub struct RoomRegistry {
    inner: Arc<RwLock<HashMap<(Uuid, Channel), Vec<Subscriber>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a connection id and its outbound queue; later `subscribe`
    /// calls reuse the same id across channels.
    pub fn open_connection() -> (SubscriberId, UnboundedSender<String>, UnboundedReceiver<String>)
    {
        let (tx, rx) = unbounded_channel();
        (SubscriberId::new(), tx, rx)
    }

    pub async fn subscribe(
        &self,
        broadcast_id: Uuid,
        channel: Channel,
        subscriber_id: SubscriberId,
        user_id: Option<Uuid>,
        sender: UnboundedSender<String>,
    ) {
        let mut guard = self.inner.write().await;
        let room = guard.entry((broadcast_id, channel)).or_default();
        if room.iter().any(|s| s.id == subscriber_id) {
            return;
        }
        room.push(Subscriber {
            id: subscriber_id,
            user_id,
            sender,
        });
        tracing::debug!(
            %broadcast_id,
            channel = channel.as_str(),
            subscribers = room.len(),
            "subscriber joined room"
        );
    }

    pub async fn unsubscribe(
        &self,
        broadcast_id: Uuid,
        channel: Channel,
        subscriber_id: SubscriberId,
    ) {
        let mut guard = self.inner.write().await;
        if let Some(room) = guard.get_mut(&(broadcast_id, channel)) {
            room.retain(|s| s.id != subscriber_id);
            if room.is_empty() {
                guard.remove(&(broadcast_id, channel));
            }
        }
    }

    /// Drop a connection from every room of a broadcast. Called once
    /// on socket close.
    pub async fn remove_connection(&self, broadcast_id: Uuid, subscriber_id: SubscriberId) {
        let mut guard = self.inner.write().await;
        guard.retain(|(bid, _), room| {
            if *bid == broadcast_id {
                room.retain(|s| s.id != subscriber_id);
            }
            !room.is_empty()
        });
    }

    /// Deliver to every live subscriber of a room, pruning dead ones.
    pub async fn broadcast(&self, broadcast_id: Uuid, channel: Channel, msg: &PushMessage) {
        let Ok(text) = serde_json::to_string(msg) else {
            tracing::error!("failed to serialize push message");
            return;
        };
        let mut guard = self.inner.write().await;
        if let Some(room) = guard.get_mut(&(broadcast_id, channel)) {
            let before = room.len();
            room.retain(|s| s.sender.send(text.clone()).is_ok());
            let pruned = before - room.len();
            if pruned > 0 {
                tracing::debug!(
                    %broadcast_id,
                    channel = channel.as_str(),
                    pruned,
                    "pruned dead subscribers"
                );
            }
            if room.is_empty() {
                guard.remove(&(broadcast_id, channel));
            }
        }
    }

    /// Deliver to one user's connections across all channels of a
    /// broadcast. Anonymous connections are never targeted.
    pub async fn broadcast_to_user(&self, broadcast_id: Uuid, user_id: Uuid, msg: &PushMessage) {
        let Ok(text) = serde_json::to_string(msg) else {
            return;
        };
        let guard = self.inner.read().await;
        let mut seen: HashSet<SubscriberId> = HashSet::new();
        for ((bid, _), room) in guard.iter() {
            if *bid != broadcast_id {
                continue;
            }
            for sub in room {
                if sub.user_id == Some(user_id) && seen.insert(sub.id) {
                    let _ = sub.sender.send(text.clone());
                }
            }
        }
    }

    pub async fn subscriber_count(&self, broadcast_id: Uuid, channel: Channel) -> usize {
        let guard = self.inner.read().await;
        guard
            .get(&(broadcast_id, channel))
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_only_the_room() {
        let registry = RoomRegistry::new();
        let bid = Uuid::new_v4();
        let other = Uuid::new_v4();

        let (id_a, tx_a, mut rx_a) = RoomRegistry::open_connection();
        let (id_b, tx_b, mut rx_b) = RoomRegistry::open_connection();

        registry
            .subscribe(bid, Channel::Timeline, id_a, None, tx_a)
            .await;
        registry
            .subscribe(other, Channel::Timeline, id_b, None, tx_b)
            .await;

        let msg = PushMessage::new(Channel::Timeline, PushBody::Pong);
        registry.broadcast(bid, Channel::Timeline, &msg).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_senders_are_pruned() {
        let registry = RoomRegistry::new();
        let bid = Uuid::new_v4();

        let (id, tx, rx) = RoomRegistry::open_connection();
        registry.subscribe(bid, Channel::Chat, id, None, tx).await;
        drop(rx);

        let msg = PushMessage::new(Channel::Chat, PushBody::Pong);
        registry.broadcast(bid, Channel::Chat, &msg).await;
        assert_eq!(registry.subscriber_count(bid, Channel::Chat).await, 0);
    }

    #[tokio::test]
    async fn user_targeting_dedupes_across_channels_and_skips_anonymous() {
        let registry = RoomRegistry::new();
        let bid = Uuid::new_v4();
        let user = Uuid::new_v4();

        let (id, tx, mut rx) = RoomRegistry::open_connection();
        registry
            .subscribe(bid, Channel::Timeline, id, Some(user), tx.clone())
            .await;
        registry
            .subscribe(bid, Channel::Orders, id, Some(user), tx)
            .await;

        let (anon_id, anon_tx, mut anon_rx) = RoomRegistry::open_connection();
        registry
            .subscribe(bid, Channel::Orders, anon_id, None, anon_tx)
            .await;

        let msg = PushMessage::new(Channel::Orders, PushBody::Pong);
        registry.broadcast_to_user(bid, user, &msg).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "one connection, one delivery");
        assert!(anon_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn remove_connection_clears_all_rooms() {
        let registry = RoomRegistry::new();
        let bid = Uuid::new_v4();

        let (id, tx, _rx) = RoomRegistry::open_connection();
        registry
            .subscribe(bid, Channel::Timeline, id, None, tx.clone())
            .await;
        registry
            .subscribe(bid, Channel::Presence, id, None, tx)
            .await;

        registry.remove_connection(bid, id).await;
        assert_eq!(registry.subscriber_count(bid, Channel::Timeline).await, 0);
        assert_eq!(registry.subscriber_count(bid, Channel::Presence).await, 0);
    }
}
