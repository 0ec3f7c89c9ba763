//! # Idempotency Guard Library
//!
//! TTL-based "set if absent" admission for client-supplied intent keys.
//! Exactly one caller per scope key is admitted within the TTL window;
//! everyone else is told the intent was already processed and should
//! look up the previously produced result instead of erroring.
//!
//! Scope keys are caller-constructed as `{domain}:{broadcast_id}:{key}`
//! (see [`scope_key`]) so the same client key can be reused across
//! unrelated domains without collisions.
//!
//! Two stores are provided: [`RedisIdempotencyStore`] (SET NX EX against
//! a shared connection manager) for production, and
//! [`MemoryIdempotencyStore`] for tests and single-process setups.
//!
//! ## Failure policy
//!
//! When the store is unreachable the guard must not guess. Call sites
//! declare a [`Policy`]:
//! - `FailClosed`: money-adjacent writes (offers, orders) are rejected
//!   with [`IdempotencyError::Unavailable`] rather than risking a
//!   duplicate side effect.
//! - `FailOpen`: cosmetic events (chat, slide changes) skip dedup and
//!   proceed, accepting a possible duplicate push over a dropped one.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};
use uuid::Uuid;

mod error;

pub use error::{IdempotencyError, IdempotencyResult};

/// Maximum accepted scope key length (matches the Redis key budget).
const MAX_KEY_LEN: usize = 255;

/// Behavior when the backing store is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Reject the request; the caller must not perform the side effect.
    FailClosed,
    /// Skip deduplication and let the request through.
    FailOpen,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First caller for this scope key within the TTL window.
    Admitted,
    /// The key was already recorded; return the previously produced
    /// result instead of repeating the side effect.
    Duplicate,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Build a namespaced scope key: `{domain}:{broadcast_id}:{caller_key}`.
pub fn scope_key(domain: &str, broadcast_id: Uuid, caller_key: &str) -> String {
    format!("{domain}:{broadcast_id}:{caller_key}")
}

/// Conditional "record if absent" storage for processed intent keys.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Record `key` if it is not already present.
    ///
    /// Returns `true` exactly once per key within `ttl`; `false` for
    /// every subsequent call until the entry expires.
    async fn admit(&self, key: &str, ttl: Duration) -> IdempotencyResult<bool>;
}

/// Redis-backed store using `SET key 1 NX EX ttl`.
///
/// The conditional set is a single round trip, so concurrent callers
/// racing on the same key serialize inside Redis: one gets `OK`, the
/// rest get nil.
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    manager: ConnectionManager,
}

impl RedisIdempotencyStore {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn admit(&self, key: &str, ttl: Duration) -> IdempotencyResult<bool> {
        let mut conn = self.manager.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| IdempotencyError::Unavailable(e.to_string()))?;

        Ok(result.is_some())
    }
}

/// In-process store for tests and single-instance deployments.
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn admit(&self, key: &str, ttl: Duration) -> IdempotencyResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("idempotency map poisoned");
        entries.retain(|_, expires_at| *expires_at > now);

        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), now + ttl);
        Ok(true)
    }
}

/// Admission guard combining a store, a default TTL, and per-call
/// failure policy.
///
/// Cheap to clone; share freely across request handlers.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: std::sync::Arc<dyn IdempotencyStore>,
    default_ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: std::sync::Arc<dyn IdempotencyStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    /// Check `scope_key` against the store using the default TTL.
    pub async fn admit(&self, scope_key: &str, policy: Policy) -> IdempotencyResult<Admission> {
        self.admit_with_ttl(scope_key, self.default_ttl, policy).await
    }

    /// Check `scope_key` against the store with an explicit TTL.
    pub async fn admit_with_ttl(
        &self,
        scope_key: &str,
        ttl: Duration,
        policy: Policy,
    ) -> IdempotencyResult<Admission> {
        validate_key(scope_key)?;

        match self.store.admit(scope_key, ttl).await {
            Ok(true) => Ok(Admission::Admitted),
            Ok(false) => {
                debug!(key = %scope_key, "duplicate intent key");
                Ok(Admission::Duplicate)
            }
            Err(e) => match policy {
                Policy::FailClosed => Err(e),
                Policy::FailOpen => {
                    warn!(key = %scope_key, error = %e, "idempotency store unavailable, proceeding without dedup");
                    Ok(Admission::Admitted)
                }
            },
        }
    }
}

fn validate_key(key: &str) -> IdempotencyResult<()> {
    if key.is_empty() {
        return Err(IdempotencyError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(IdempotencyError::InvalidKey(format!(
            "key too long: {} characters (max {MAX_KEY_LEN})",
            key.len()
        )));
    }
    Ok(())
}
