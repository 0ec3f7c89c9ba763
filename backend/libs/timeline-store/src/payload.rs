//! The closed timeline event catalog.
//!
//! Every state change that can happen during a broadcast is one of
//! these variants. The enum is adjacently tagged so a serialized event
//! reads `{"type": "OFFER_OPEN", "payload": {...}}`, mirroring the wire
//! envelope pushed to clients. Consumers match exhaustively; adding a
//! variant is a compile error everywhere it matters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Why an offer transitioned to `closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Manual,
    SoldOut,
    Expired,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Manual => "manual",
            CloseReason::SoldOut => "sold_out",
            CloseReason::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(CloseReason::Manual),
            "sold_out" => Some(CloseReason::SoldOut),
            "expired" => Some(CloseReason::Expired),
            _ => None,
        }
    }
}

/// Product details snapshotted into an `OFFER_OPEN` event so replay
/// does not depend on the product record still existing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinAction {
    Pin,
    Unpin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModAction {
    Delete,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideDirection {
    Forward,
    Backward,
}

/// Type tag of a timeline event, without its payload.
///
/// Kept in lockstep with [`EventPayload`]; the string form is what goes
/// into the `event_type` column and the wire `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    LinkDrop,
    FileDrop,
    OfferOpen,
    OfferClose,
    CountdownStart,
    CountdownEnd,
    ChapterMark,
    PinMessage,
    ChatModAction,
    OrderCreated,
    OrderPaid,
    OrderFailed,
    PresentationStart,
    PresentationEnd,
    SlideChange,
    LayoutChange,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LinkDrop => "LINK_DROP",
            EventKind::FileDrop => "FILE_DROP",
            EventKind::OfferOpen => "OFFER_OPEN",
            EventKind::OfferClose => "OFFER_CLOSE",
            EventKind::CountdownStart => "COUNTDOWN_START",
            EventKind::CountdownEnd => "COUNTDOWN_END",
            EventKind::ChapterMark => "CHAPTER_MARK",
            EventKind::PinMessage => "PIN_MESSAGE",
            EventKind::ChatModAction => "CHAT_MOD_ACTION",
            EventKind::OrderCreated => "ORDER_CREATED",
            EventKind::OrderPaid => "ORDER_PAID",
            EventKind::OrderFailed => "ORDER_FAILED",
            EventKind::PresentationStart => "PRESENTATION_START",
            EventKind::PresentationEnd => "PRESENTATION_END",
            EventKind::SlideChange => "SLIDE_CHANGE",
            EventKind::LayoutChange => "LAYOUT_CHANGE",
        }
    }

    /// Whether duplicates of this kind would corrupt money-adjacent
    /// state. Drives the idempotency guard failure policy.
    pub fn is_monetary(&self) -> bool {
        matches!(
            self,
            EventKind::OfferOpen
                | EventKind::OfferClose
                | EventKind::OrderCreated
                | EventKind::OrderPaid
                | EventKind::OrderFailed
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventKind(pub String);

impl std::str::FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LINK_DROP" => Ok(EventKind::LinkDrop),
            "FILE_DROP" => Ok(EventKind::FileDrop),
            "OFFER_OPEN" => Ok(EventKind::OfferOpen),
            "OFFER_CLOSE" => Ok(EventKind::OfferClose),
            "COUNTDOWN_START" => Ok(EventKind::CountdownStart),
            "COUNTDOWN_END" => Ok(EventKind::CountdownEnd),
            "CHAPTER_MARK" => Ok(EventKind::ChapterMark),
            "PIN_MESSAGE" => Ok(EventKind::PinMessage),
            "CHAT_MOD_ACTION" => Ok(EventKind::ChatModAction),
            "ORDER_CREATED" => Ok(EventKind::OrderCreated),
            "ORDER_PAID" => Ok(EventKind::OrderPaid),
            "ORDER_FAILED" => Ok(EventKind::OrderFailed),
            "PRESENTATION_START" => Ok(EventKind::PresentationStart),
            "PRESENTATION_END" => Ok(EventKind::PresentationEnd),
            "SLIDE_CHANGE" => Ok(EventKind::SlideChange),
            "LAYOUT_CHANGE" => Ok(EventKind::LayoutChange),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

/// A timeline event's type tag plus its type-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    LinkDrop {
        title: String,
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        thumbnail_url: Option<String>,
        requires_purchase: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        offer_id: Option<Uuid>,
    },
    FileDrop {
        title: String,
        file_key: String,
        signed_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_size: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        requires_purchase: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        offer_id: Option<Uuid>,
    },
    OfferOpen {
        offer_id: Uuid,
        title: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        price: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        original_price: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        discount_percent: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        quantity_limit: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        quantity_remaining: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time_limit_seconds: Option<i32>,
        product: ProductSnapshot,
    },
    OfferClose {
        offer_id: Uuid,
        reason: CloseReason,
        quantity_sold: i32,
        revenue: f64,
    },
    CountdownStart {
        duration_seconds: i64,
        label: String,
        ends_at: DateTime<Utc>,
    },
    CountdownEnd {
        label: String,
    },
    ChapterMark {
        title: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    PinMessage {
        message_id: Uuid,
        action: PinAction,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    ChatModAction {
        message_id: Uuid,
        action: ModAction,
        moderator_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        offer_id: Uuid,
        amount: f64,
    },
    OrderPaid {
        order_id: Uuid,
        user_id: Uuid,
        offer_id: Uuid,
        amount: f64,
    },
    OrderFailed {
        order_id: Uuid,
        reason: String,
    },
    PresentationStart {
        presentation_id: Uuid,
        title: String,
        total_slides: i32,
        initial_slide_index: i32,
    },
    PresentationEnd {
        presentation_id: Uuid,
    },
    SlideChange {
        presentation_id: Uuid,
        slide_index: i32,
        total_slides: i32,
        direction: SlideDirection,
    },
    LayoutChange {
        mode: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        transition_duration_ms: Option<i64>,
    },
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("unknown event type: {0}")]
    UnknownKind(String),
    #[error("payload does not match event type {kind}: {source}")]
    Shape {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl EventPayload {
    /// The type tag for this payload. Exhaustive by construction.
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::LinkDrop { .. } => EventKind::LinkDrop,
            EventPayload::FileDrop { .. } => EventKind::FileDrop,
            EventPayload::OfferOpen { .. } => EventKind::OfferOpen,
            EventPayload::OfferClose { .. } => EventKind::OfferClose,
            EventPayload::CountdownStart { .. } => EventKind::CountdownStart,
            EventPayload::CountdownEnd { .. } => EventKind::CountdownEnd,
            EventPayload::ChapterMark { .. } => EventKind::ChapterMark,
            EventPayload::PinMessage { .. } => EventKind::PinMessage,
            EventPayload::ChatModAction { .. } => EventKind::ChatModAction,
            EventPayload::OrderCreated { .. } => EventKind::OrderCreated,
            EventPayload::OrderPaid { .. } => EventKind::OrderPaid,
            EventPayload::OrderFailed { .. } => EventKind::OrderFailed,
            EventPayload::PresentationStart { .. } => EventKind::PresentationStart,
            EventPayload::PresentationEnd { .. } => EventKind::PresentationEnd,
            EventPayload::SlideChange { .. } => EventKind::SlideChange,
            EventPayload::LayoutChange { .. } => EventKind::LayoutChange,
        }
    }

    /// Split into a type tag and a bare JSON payload for column storage.
    pub fn to_parts(&self) -> Result<(EventKind, serde_json::Value), PayloadError> {
        let tagged = serde_json::to_value(self)?;
        let payload = tagged
            .get("payload")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        Ok((self.kind(), payload))
    }

    /// Reassemble from an `event_type` column value plus a bare payload.
    pub fn from_parts(kind: &str, payload: serde_json::Value) -> Result<Self, PayloadError> {
        let kind: EventKind = kind
            .parse()
            .map_err(|UnknownEventKind(s)| PayloadError::UnknownKind(s))?;
        let tagged = serde_json::json!({ "type": kind.as_str(), "payload": payload });
        serde_json::from_value(tagged).map_err(|source| PayloadError::Shape { kind, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_use_screaming_snake_case() {
        let payload = EventPayload::ChapterMark {
            title: "Intro".into(),
            description: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "CHAPTER_MARK");
        assert_eq!(json["payload"]["title"], "Intro");
    }

    #[test]
    fn parts_round_trip() {
        let payload = EventPayload::OfferClose {
            offer_id: Uuid::new_v4(),
            reason: CloseReason::SoldOut,
            quantity_sold: 3,
            revenue: 89.97,
        };
        let (kind, value) = payload.to_parts().unwrap();
        assert_eq!(kind, EventKind::OfferClose);
        assert_eq!(value["reason"], "sold_out");

        let rebuilt = EventPayload::from_parts(kind.as_str(), value).unwrap();
        assert_eq!(rebuilt, payload);
    }

    #[test]
    fn from_parts_rejects_unknown_kind() {
        let err = EventPayload::from_parts("MYSTERY", serde_json::json!({})).unwrap_err();
        assert!(matches!(err, PayloadError::UnknownKind(_)));
    }

    #[test]
    fn from_parts_rejects_mismatched_shape() {
        let err = EventPayload::from_parts("OFFER_CLOSE", serde_json::json!({"title": "x"}))
            .unwrap_err();
        assert!(matches!(err, PayloadError::Shape { kind: EventKind::OfferClose, .. }));
    }

    #[test]
    fn kind_string_round_trip() {
        for kind in [
            EventKind::LinkDrop,
            EventKind::FileDrop,
            EventKind::OfferOpen,
            EventKind::OfferClose,
            EventKind::CountdownStart,
            EventKind::CountdownEnd,
            EventKind::ChapterMark,
            EventKind::PinMessage,
            EventKind::ChatModAction,
            EventKind::OrderCreated,
            EventKind::OrderPaid,
            EventKind::OrderFailed,
            EventKind::PresentationStart,
            EventKind::PresentationEnd,
            EventKind::SlideChange,
            EventKind::LayoutChange,
        ] {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }
}
