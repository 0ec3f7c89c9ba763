//! Replay composition. A deterministic projection of the stored log
//! plus broadcast metadata and the finished recording; composing the
//! same ended broadcast twice yields the same replay.

use std::sync::Arc;
use timeline_store::{EventPayload, TimelineStore};
use uuid::Uuid;

use crate::collab::{BroadcastDirectory, RecordingProvider};
use crate::error::{AppError, AppResult};
use crate::models::{Replay, ReplayChapter, ReplayEntry};

pub struct ReplayService {
    store: Arc<dyn TimelineStore>,
    directory: Arc<dyn BroadcastDirectory>,
    recordings: Arc<dyn RecordingProvider>,
}

impl ReplayService {
    pub fn new(
        store: Arc<dyn TimelineStore>,
        directory: Arc<dyn BroadcastDirectory>,
        recordings: Arc<dyn RecordingProvider>,
    ) -> Self {
        Self {
            store,
            directory,
            recordings,
        }
    }

    pub async fn build_replay(&self, broadcast_id: Uuid) -> AppResult<Replay> {
        let info = self
            .directory
            .get(broadcast_id)
            .await
            .ok_or(AppError::NotFound)?;
        let recording = self
            .recordings
            .ready_recording(broadcast_id)
            .await
            .ok_or(AppError::NotFound)?;

        // Prefer the broadcast's own start/end delta; fall back to the
        // recording's reported duration.
        let duration_seconds = match (info.actual_start, info.actual_end) {
            (Some(start), Some(end)) => (end - start).num_seconds().max(0),
            _ => recording.duration_seconds,
        };

        let events = self.store.list(broadcast_id, i64::MAX, 0).await?;

        let mut timeline = Vec::with_capacity(events.len());
        let mut chapters = Vec::new();
        for event in &events {
            if let EventPayload::ChapterMark { title, .. } = &event.payload {
                chapters.push(ReplayChapter {
                    title: title.clone(),
                    timestamp_ms: event.timestamp_ms,
                });
            }
            let (kind, payload) = event.payload.to_parts()?;
            timeline.push(ReplayEntry {
                event_id: event.id,
                kind: kind.as_str().to_string(),
                timestamp_ms: event.timestamp_ms,
                payload,
            });
        }

        Ok(Replay {
            broadcast_id,
            playback_url: recording.playback_url,
            duration_seconds,
            timeline,
            chapters,
            replay_offers_enabled: info.replay_offers_enabled,
        })
    }
}
