//! Wire protocol for the realtime socket.
//!
//! Server pushes are enveloped as `{"channel": ..., "type": ...,
//! "data": {...}}`. Client frames are tagged with a lowercase `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::Channel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    pub channel: Channel,
    #[serde(flatten)]
    pub body: PushBody,
}

impl PushMessage {
    pub fn new(channel: Channel, body: PushBody) -> Self {
        Self { channel, body }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushBody {
    /// A freshly appended timeline event, serialized in full.
    TimelineEvent(Value),
    ViewerCount {
        count: i64,
    },
    HostStatus {
        live: bool,
    },
    ChatMessage {
        message_id: Uuid,
        user_id: Uuid,
        display_name: String,
        content: String,
        sent_at: DateTime<Utc>,
    },
    ChatDelete {
        message_id: Uuid,
    },
    ChatPin {
        message_id: Uuid,
        pinned: bool,
        content: Option<String>,
    },
    OrderUpdate {
        order_id: Uuid,
        offer_id: Uuid,
        status: String,
    },
    Subscribed {
        channels: Vec<Channel>,
    },
    Pong,
    Error {
        message: String,
    },
}

/// Frames a client may send over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { channels: Vec<Channel> },
    Unsubscribe { channels: Vec<Channel> },
    ChatMessage {
        content: String,
        idempotency_key: String,
    },
    /// Request a catch-up after reconnect.
    StateSync {
        #[serde(default)]
        last_event_id: Option<Uuid>,
    },
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_envelope_shape() {
        let msg = PushMessage::new(Channel::Presence, PushBody::ViewerCount { count: 42 });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["channel"], "presence");
        assert_eq!(json["type"], "VIEWER_COUNT");
        assert_eq!(json["data"]["count"], 42);
    }

    #[test]
    fn client_frame_parses_chat_message() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"chat_message","content":"hello","idempotency_key":"k1"}"#,
        )
        .unwrap();
        assert!(matches!(frame, ClientFrame::ChatMessage { .. }));
    }

    #[test]
    fn client_frame_parses_subscribe() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"subscribe","channels":["chat","orders"]}"#).unwrap();
        match frame {
            ClientFrame::Subscribe { channels } => {
                assert_eq!(channels, vec![Channel::Chat, Channel::Orders]);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
