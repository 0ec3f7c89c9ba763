use std::sync::Arc;

use crate::collab::{AuthVerifier, BroadcastDirectory};
use crate::config::Config;
use crate::services::{
    ChatService, OfferService, OrderNotifier, PresenceService, ReplayService, TimelineService,
};
use crate::websocket::FanoutHub;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub timeline: Arc<TimelineService>,
    pub offers: Arc<OfferService>,
    pub presence: Arc<PresenceService>,
    pub chat: Arc<ChatService>,
    pub replay: Arc<ReplayService>,
    pub orders: Arc<OrderNotifier>,
    pub auth: Arc<dyn AuthVerifier>,
    pub directory: Arc<dyn BroadcastDirectory>,
    pub hub: FanoutHub,
}
