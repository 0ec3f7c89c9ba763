//! Clients for the surrounding platform services. Each seam is a
//! trait so the engine can run against in-memory fakes in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod http;
pub mod memory;

pub use http::{HttpAuthVerifier, HttpBroadcastDirectory, HttpOrderLedger, HttpRecordingProvider};
pub use memory::{
    StaticAuthVerifier, StaticBroadcastDirectory, StaticOrderLedger, StaticRecordingProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Host,
    Moderator,
    Viewer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStatus {
    Scheduled,
    Live,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastInfo {
    pub id: Uuid,
    pub host_id: Uuid,
    pub status: BroadcastStatus,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub chat_enabled: bool,
    pub replay_offers_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub playback_url: String,
    pub duration_seconds: i64,
}

/// Token introspection against the auth service.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<Identity>;
}

/// Broadcast metadata lookups. The engine never owns broadcast rows.
#[async_trait]
pub trait BroadcastDirectory: Send + Sync {
    async fn get(&self, broadcast_id: Uuid) -> Option<BroadcastInfo>;
}

/// Order totals, used when composing the offer-close summary.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn paid_revenue(&self, offer_id: Uuid) -> f64;
}

/// Recording pipeline lookups for replay composition.
#[async_trait]
pub trait RecordingProvider: Send + Sync {
    async fn ready_recording(&self, broadcast_id: Uuid) -> Option<Recording>;
}
