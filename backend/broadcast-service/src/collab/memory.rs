//! In-memory collaborator fakes used by tests and local runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{AuthVerifier, BroadcastDirectory, BroadcastInfo, Identity, OrderLedger, Recording,
            RecordingProvider};

/// Maps bearer tokens to identities.
#[derive(Default)]
pub struct StaticAuthVerifier {
    identities: Mutex<HashMap<String, Identity>>,
}

impl StaticAuthVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, token: impl Into<String>, identity: Identity) {
        self.identities
            .lock()
            .unwrap()
            .insert(token.into(), identity);
    }
}

#[async_trait]
impl AuthVerifier for StaticAuthVerifier {
    async fn verify(&self, token: &str) -> Option<Identity> {
        self.identities.lock().unwrap().get(token).cloned()
    }
}

#[derive(Default)]
pub struct StaticBroadcastDirectory {
    broadcasts: Mutex<HashMap<Uuid, BroadcastInfo>>,
}

impl StaticBroadcastDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, info: BroadcastInfo) {
        self.broadcasts.lock().unwrap().insert(info.id, info);
    }
}

#[async_trait]
impl BroadcastDirectory for StaticBroadcastDirectory {
    async fn get(&self, broadcast_id: Uuid) -> Option<BroadcastInfo> {
        self.broadcasts.lock().unwrap().get(&broadcast_id).cloned()
    }
}

#[derive(Default)]
pub struct StaticOrderLedger {
    revenue: Mutex<HashMap<Uuid, f64>>,
}

impl StaticOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_revenue(&self, offer_id: Uuid, amount: f64) {
        self.revenue.lock().unwrap().insert(offer_id, amount);
    }
}

#[async_trait]
impl OrderLedger for StaticOrderLedger {
    async fn paid_revenue(&self, offer_id: Uuid) -> f64 {
        self.revenue
            .lock()
            .unwrap()
            .get(&offer_id)
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Default)]
pub struct StaticRecordingProvider {
    recordings: Mutex<HashMap<Uuid, Recording>>,
}

impl StaticRecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, broadcast_id: Uuid, recording: Recording) {
        self.recordings
            .lock()
            .unwrap()
            .insert(broadcast_id, recording);
    }
}

#[async_trait]
impl RecordingProvider for StaticRecordingProvider {
    async fn ready_recording(&self, broadcast_id: Uuid) -> Option<Recording> {
        self.recordings.lock().unwrap().get(&broadcast_id).cloned()
    }
}
