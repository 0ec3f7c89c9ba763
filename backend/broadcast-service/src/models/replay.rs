use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Packaged on-demand view of a finished broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct Replay {
    pub broadcast_id: Uuid,
    pub playback_url: String,
    pub duration_seconds: i64,
    pub timeline: Vec<ReplayEntry>,
    pub chapters: Vec<ReplayChapter>,
    pub replay_offers_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayEntry {
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp_ms: i64,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayChapter {
    pub title: String,
    pub timestamp_ms: i64,
}
