use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use timeline_store::CloseReason;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Active,
    Paused,
    Closed,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Active => "active",
            OfferStatus::Paused => "paused",
            OfferStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OfferStatus::Pending),
            "active" => Some(OfferStatus::Active),
            "paused" => Some(OfferStatus::Paused),
            "closed" => Some(OfferStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub broadcast_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_image_url: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub offer_price: f64,
    pub original_price: Option<f64>,
    pub discount_percent: Option<i32>,
    pub quantity_limit: Option<i32>,
    pub quantity_claimed: i32,
    pub time_limit_seconds: Option<i32>,
    pub status: OfferStatus,
    pub close_reason: Option<CloseReason>,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn quantity_remaining(&self) -> Option<i32> {
        self.quantity_limit
            .map(|limit| (limit - self.quantity_claimed).max(0))
    }
}

/// Creation input; everything else is stamped by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOffer {
    pub broadcast_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_image_url: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub offer_price: f64,
    pub original_price: Option<f64>,
    pub discount_percent: Option<i32>,
    pub quantity_limit: Option<i32>,
    pub time_limit_seconds: Option<i32>,
}

/// Result of a single claim attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub success: bool,
    pub quantity_claimed: i32,
    pub quantity_limit: Option<i32>,
    pub quantity_remaining: Option<i32>,
    /// Set for exactly one claimer when the claim consumes the last unit.
    pub sold_out: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_never_negative() {
        let offer = Offer {
            id: Uuid::new_v4(),
            broadcast_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "cap".into(),
            product_image_url: None,
            title: "flash cap".into(),
            description: None,
            offer_price: 9.99,
            original_price: None,
            discount_percent: None,
            quantity_limit: Some(5),
            quantity_claimed: 7,
            time_limit_seconds: None,
            status: OfferStatus::Closed,
            close_reason: Some(CloseReason::SoldOut),
            opened_at: None,
            closed_at: None,
            expires_at: None,
            created_at: Utc::now(),
        };
        assert_eq!(offer.quantity_remaining(), Some(0));
    }
}
