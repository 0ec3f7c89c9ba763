//! reqwest-backed collaborator clients. Lookups degrade to `None`
//! (or zero revenue) on transport errors; callers decide whether that
//! is fatal for their operation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

use super::{AuthVerifier, BroadcastDirectory, BroadcastInfo, Identity, OrderLedger, Recording,
            RecordingProvider};

fn default_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_default()
}

pub struct HttpAuthVerifier {
    client: Client,
    base_url: String,
}

impl HttpAuthVerifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: default_client(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AuthVerifier for HttpAuthVerifier {
    async fn verify(&self, token: &str) -> Option<Identity> {
        let url = format!("{}/internal/auth/verify", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<Identity>().await.ok()
    }
}

pub struct HttpBroadcastDirectory {
    client: Client,
    base_url: String,
}

impl HttpBroadcastDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: default_client(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BroadcastDirectory for HttpBroadcastDirectory {
    async fn get(&self, broadcast_id: Uuid) -> Option<BroadcastInfo> {
        let url = format!("{}/internal/broadcasts/{}", self.base_url, broadcast_id);
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<BroadcastInfo>().await.ok()
    }
}

pub struct HttpOrderLedger {
    client: Client,
    base_url: String,
}

impl HttpOrderLedger {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: default_client(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct RevenueResponse {
    paid_revenue: f64,
}

#[async_trait]
impl OrderLedger for HttpOrderLedger {
    async fn paid_revenue(&self, offer_id: Uuid) -> f64 {
        let url = format!("{}/internal/offers/{}/revenue", self.base_url, offer_id);
        let resp = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(%offer_id, status = %r.status(), "revenue lookup failed");
                return 0.0;
            }
            Err(e) => {
                tracing::warn!(%offer_id, error = %e, "revenue lookup failed");
                return 0.0;
            }
        };
        resp.json::<RevenueResponse>()
            .await
            .map(|r| r.paid_revenue)
            .unwrap_or(0.0)
    }
}

pub struct HttpRecordingProvider {
    client: Client,
    base_url: String,
}

impl HttpRecordingProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: default_client(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Deserialize)]
struct RecordingResponse {
    status: String,
    playback_url: String,
    duration_seconds: i64,
}

#[async_trait]
impl RecordingProvider for HttpRecordingProvider {
    async fn ready_recording(&self, broadcast_id: Uuid) -> Option<Recording> {
        let url = format!(
            "{}/internal/broadcasts/{}/recording",
            self.base_url, broadcast_id
        );
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body = resp.json::<RecordingResponse>().await.ok()?;
        if body.status != "ready" {
            return None;
        }
        Some(Recording {
            playback_url: body.playback_url,
            duration_seconds: body.duration_seconds,
        })
    }
}
