pub mod offer;
pub mod replay;

pub use offer::{ClaimOutcome, NewOffer, Offer, OfferStatus};
pub use replay::{Replay, ReplayChapter, ReplayEntry};
