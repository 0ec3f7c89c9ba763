//! Shared harness: the full service graph wired to in-memory stores
//! and static collaborators, no Postgres or Redis required.

use std::sync::Arc;
use std::time::Duration;

use broadcast_service::collab::{
    BroadcastInfo, BroadcastStatus, Identity, Role, StaticBroadcastDirectory, StaticOrderLedger,
    StaticRecordingProvider,
};
use broadcast_service::services::{
    ChatService, MemoryRateLimiter, OfferService, OrderNotifier, PresenceService, ReplayService,
    TimelineService,
};
use broadcast_service::store::{MemoryOfferStore, MemoryPresenceStore};
use broadcast_service::websocket::{FanoutHub, RoomRegistry};
use chrono::{Duration as ChronoDuration, Utc};
use idempotency::{IdempotencyGuard, MemoryIdempotencyStore};
use timeline_store::MemoryTimelineStore;
use uuid::Uuid;

pub struct TestEngine {
    pub timeline: Arc<TimelineService>,
    pub offers: Arc<OfferService>,
    pub chat: Arc<ChatService>,
    pub replay: Arc<ReplayService>,
    pub presence: Arc<PresenceService>,
    pub order_notifier: Arc<OrderNotifier>,
    pub directory: Arc<StaticBroadcastDirectory>,
    pub ledger: Arc<StaticOrderLedger>,
    pub recordings: Arc<StaticRecordingProvider>,
    pub registry: RoomRegistry,
}

impl TestEngine {
    pub fn new() -> Self {
        let registry = RoomRegistry::new();
        let hub = FanoutHub::new(registry.clone(), None);
        let guard = IdempotencyGuard::new(
            Arc::new(MemoryIdempotencyStore::new()),
            Duration::from_secs(86_400),
        );

        let directory = Arc::new(StaticBroadcastDirectory::new());
        let ledger = Arc::new(StaticOrderLedger::new());
        let recordings = Arc::new(StaticRecordingProvider::new());

        let event_store = Arc::new(MemoryTimelineStore::new());
        let timeline = Arc::new(TimelineService::new(
            event_store.clone(),
            guard.clone(),
            directory.clone(),
            hub.clone(),
        ));
        let offers = Arc::new(OfferService::new(
            Arc::new(MemoryOfferStore::new()),
            guard.clone(),
            directory.clone(),
            ledger.clone(),
            timeline.clone(),
        ));
        let chat = Arc::new(ChatService::new(
            guard,
            directory.clone(),
            Arc::new(MemoryRateLimiter::new(10, Duration::from_secs(30))),
            timeline.clone(),
            hub.clone(),
        ));
        let replay = Arc::new(ReplayService::new(
            event_store,
            directory.clone(),
            recordings.clone(),
        ));
        let presence = Arc::new(PresenceService::new(
            Arc::new(MemoryPresenceStore::new()),
            hub.clone(),
        ));
        let order_notifier = Arc::new(OrderNotifier::new(timeline.clone(), hub));

        Self {
            timeline,
            offers,
            chat,
            replay,
            presence,
            order_notifier,
            directory,
            ledger,
            recordings,
            registry,
        }
    }

    /// Registers a live broadcast and returns `(broadcast_id, host_id)`.
    pub fn live_broadcast(&self) -> (Uuid, Uuid) {
        let broadcast_id = Uuid::new_v4();
        let host_id = Uuid::new_v4();
        self.directory.upsert(BroadcastInfo {
            id: broadcast_id,
            host_id,
            status: BroadcastStatus::Live,
            actual_start: Some(Utc::now() - ChronoDuration::minutes(5)),
            actual_end: None,
            chat_enabled: true,
            replay_offers_enabled: true,
        });
        (broadcast_id, host_id)
    }

    pub fn viewer(&self) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            role: Role::Viewer,
            display_name: "viewer".into(),
        }
    }
}
