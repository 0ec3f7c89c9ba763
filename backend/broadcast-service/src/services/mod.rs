pub mod chat;
pub mod offers;
pub mod orders;
pub mod presence;
pub mod replay;
pub mod timeline;

pub use chat::{ChatService, MemoryRateLimiter, RateLimiter, RedisRateLimiter};
pub use offers::OfferService;
pub use orders::{OrderNotifier, OrderStatus, OrderUpdate};
pub use presence::PresenceService;
pub use replay::ReplayService;
pub use timeline::TimelineService;
