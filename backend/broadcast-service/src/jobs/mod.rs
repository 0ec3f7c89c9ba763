pub mod offer_expiry;
