pub mod offers;
pub mod presence;

pub use offers::{MemoryOfferStore, OfferStore, PgOfferStore};
pub use presence::{MemoryPresenceStore, PresenceStore, RedisPresenceStore};
