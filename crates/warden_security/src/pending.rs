//! Registry of in-flight identity lookups.
//!
//! Identity resolution is asynchronous: a query is sent for a nickname and
//! the reply arrives later as an unrelated event. The registry keeps one
//! continuation per nickname and guarantees it runs exactly once, with either
//! the reply, a not-found marker, or an expiry.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use warden_core::IdentityReply;
use warden_error::{SecurityError, SecurityErrorKind, SecurityResult};

/// How a lookup ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The network reported user and host for the nickname
    Resolved(IdentityReply),
    /// The network reported no such nickname
    NotFound,
    /// No answer arrived in time
    Expired,
}

/// Callback invoked once when a lookup ends.
pub type Continuation = Box<dyn FnOnce(LookupOutcome) + Send + 'static>;

/// Identifies one registration, so a late timer cannot expire a newer lookup
/// registered under the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupTicket {
    key: String,
    id: u64,
}

impl LookupTicket {
    /// Normalized key the lookup was registered under.
    pub fn key(&self) -> &str {
        &self.key
    }
}

struct PendingLookup {
    id: u64,
    created_at: Instant,
    continuation: Continuation,
}

/// Normalize a nickname into a lookup key.
///
/// Nicknames compare case-insensitively on the network.
pub fn query_key(nickname: &str) -> String {
    nickname.trim().to_ascii_lowercase()
}

/// Map from lookup key to the continuation awaiting its answer.
///
/// Continuations always run after the internal lock is released, so they may
/// call back into the registry.
#[derive(Default)]
pub struct PendingResolutionRegistry {
    entries: Mutex<HashMap<String, PendingLookup>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for PendingResolutionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResolutionRegistry")
            .field("pending", &self.len())
            .finish_non_exhaustive()
    }
}

impl PendingResolutionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a continuation for `nickname`.
    ///
    /// # Errors
    ///
    /// `DuplicateQuery` when a lookup for the same key is already pending.
    /// The existing continuation is left untouched.
    #[instrument(skip(self, continuation))]
    pub fn register<F>(&self, nickname: &str, continuation: F) -> SecurityResult<LookupTicket>
    where
        F: FnOnce(LookupOutcome) + Send + 'static,
    {
        let key = query_key(nickname);
        let mut entries = self.entries.lock();
        if entries.contains_key(&key) {
            warn!(key = %key, "Lookup already pending");
            return Err(SecurityError::new(SecurityErrorKind::DuplicateQuery { key }));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            key.clone(),
            PendingLookup {
                id,
                created_at: Instant::now(),
                continuation: Box::new(continuation),
            },
        );
        debug!(key = %key, id, "Lookup registered");
        Ok(LookupTicket { key, id })
    }

    /// Register a continuation that expires on its own after `timeout`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn register_with_timeout<F>(
        self: &Arc<Self>,
        nickname: &str,
        timeout: Duration,
        continuation: F,
    ) -> SecurityResult<LookupTicket>
    where
        F: FnOnce(LookupOutcome) + Send + 'static,
    {
        let ticket = self.register(nickname, continuation)?;
        let registry: Weak<Self> = Arc::downgrade(self);
        let expiring = ticket.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(registry) = registry.upgrade() {
                registry.expire_ticket(&expiring);
            }
        });
        Ok(ticket)
    }

    /// Complete the lookup for `nickname` with `outcome`.
    ///
    /// Returns `false` when nothing was pending; a second resolution of the
    /// same lookup is always a no-op.
    pub fn resolve(&self, nickname: &str, outcome: LookupOutcome) -> bool {
        let key = query_key(nickname);
        let entry = self.entries.lock().remove(&key);
        match entry {
            Some(entry) => {
                debug!(key = %key, id = entry.id, ?outcome, "Lookup completed");
                (entry.continuation)(outcome);
                true
            }
            None => {
                debug!(key = %key, "No lookup pending");
                false
            }
        }
    }

    /// Complete the lookup for `nickname` as expired.
    pub fn expire(&self, nickname: &str) -> bool {
        self.resolve(nickname, LookupOutcome::Expired)
    }

    /// Expire exactly the registration identified by `ticket`.
    pub fn expire_ticket(&self, ticket: &LookupTicket) -> bool {
        let entry = {
            let mut entries = self.entries.lock();
            match entries.get(&ticket.key) {
                Some(entry) if entry.id == ticket.id => entries.remove(&ticket.key),
                _ => None,
            }
        };
        match entry {
            Some(entry) => {
                debug!(key = %ticket.key, id = entry.id, "Lookup expired");
                (entry.continuation)(LookupOutcome::Expired);
                true
            }
            None => false,
        }
    }

    /// Expire every lookup registered at least `max_age` before `now`.
    ///
    /// Returns how many were expired.
    pub fn purge_stale(&self, max_age: Duration, now: Instant) -> usize {
        let stale: Vec<(String, PendingLookup)> = {
            let mut entries = self.entries.lock();
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| now.saturating_duration_since(entry.created_at) >= max_age)
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.remove(&key).map(|entry| (key, entry)))
                .collect()
        };

        let count = stale.len();
        for (key, entry) in stale {
            debug!(key = %key, id = entry.id, "Purging stale lookup");
            (entry.continuation)(LookupOutcome::Expired);
        }
        count
    }

    /// Whether a lookup for `nickname` is pending.
    pub fn is_pending(&self, nickname: &str) -> bool {
        self.entries.lock().contains_key(&query_key(nickname))
    }

    /// Number of pending lookups.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no lookup is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
