//! Order progress notifications from the payment flow. Each update is
//! recorded on the timeline and pushed privately to the buyer's own
//! connections on the `orders` channel.

use serde::Deserialize;
use std::sync::Arc;
use timeline_store::EventPayload;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::timeline::TimelineService;
use crate::websocket::{Channel, FanoutHub, PushBody, PushMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Paid,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderUpdate {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub offer_id: Uuid,
    pub status: OrderStatus,
    pub amount: f64,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub idempotency_key: String,
}

pub struct OrderNotifier {
    timeline: Arc<TimelineService>,
    hub: FanoutHub,
}

impl OrderNotifier {
    pub fn new(timeline: Arc<TimelineService>, hub: FanoutHub) -> Self {
        Self { timeline, hub }
    }

    pub async fn notify(&self, broadcast_id: Uuid, update: OrderUpdate) -> AppResult<()> {
        let payload = match update.status {
            OrderStatus::Created => EventPayload::OrderCreated {
                order_id: update.order_id,
                user_id: update.user_id,
                offer_id: update.offer_id,
                amount: update.amount,
            },
            OrderStatus::Paid => EventPayload::OrderPaid {
                order_id: update.order_id,
                user_id: update.user_id,
                offer_id: update.offer_id,
                amount: update.amount,
            },
            OrderStatus::Failed => EventPayload::OrderFailed {
                order_id: update.order_id,
                reason: update
                    .failure_reason
                    .clone()
                    .ok_or_else(|| AppError::BadRequest("failure_reason required".into()))?,
            },
        };

        self.timeline
            .append(broadcast_id, payload, None, &update.idempotency_key)
            .await?;

        self.hub
            .broadcast_to_user(
                broadcast_id,
                update.user_id,
                &PushMessage::new(
                    Channel::Orders,
                    PushBody::OrderUpdate {
                        order_id: update.order_id,
                        offer_id: update.offer_id,
                        status: update.status.as_str().to_string(),
                    },
                ),
            )
            .await;
        Ok(())
    }
}
