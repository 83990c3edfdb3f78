//! TTL-throttled cache over the premium entitlement client.
//!
//! The cached snapshot is replaced whole (copy-on-write), never mutated in
//! place, so concurrent readers always observe a consistent record.
//! Metadata queries read the cache without ever triggering a network
//! refresh; only `get_or_refresh` does, and only past the TTL.

use aside_interaction::{PremiumClient, PremiumSnapshot};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

struct CachedPremium {
    snapshot: PremiumSnapshot,
    fetched_at: Option<Instant>,
}

/// Process-wide premium status cache.
pub struct PremiumCache {
    client: Arc<dyn PremiumClient>,
    ttl: Duration,
    state: RwLock<Arc<CachedPremium>>,
}

impl PremiumCache {
    /// Creates a cache over the given client; the initial snapshot is
    /// `Unknown` and stale.
    pub fn new(client: Arc<dyn PremiumClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            state: RwLock::new(Arc::new(CachedPremium {
                snapshot: PremiumSnapshot::unknown(),
                fetched_at: None,
            })),
        }
    }

    /// Returns the cached snapshot without any refresh.
    pub fn cached(&self) -> PremiumSnapshot {
        self.state
            .read()
            .expect("premium cache lock poisoned")
            .snapshot
            .clone()
    }

    /// Whether the cached snapshot is still within its TTL.
    pub fn is_fresh(&self) -> bool {
        self.state
            .read()
            .expect("premium cache lock poisoned")
            .fetched_at
            .is_some_and(|at| at.elapsed() < self.ttl)
    }

    /// Returns the cached snapshot, refreshing through the client first if
    /// the TTL has lapsed.
    ///
    /// A failed refresh degrades to the previous snapshot rather than
    /// erroring: entitlement is advisory state, not a hard dependency.
    pub async fn get_or_refresh(&self) -> PremiumSnapshot {
        if self.is_fresh() {
            return self.cached();
        }

        match self.client.fetch_status().await {
            Ok(snapshot) => {
                let mut state = self.state.write().expect("premium cache lock poisoned");
                *state = Arc::new(CachedPremium {
                    snapshot: snapshot.clone(),
                    fetched_at: Some(Instant::now()),
                });
                snapshot
            }
            Err(err) => {
                tracing::warn!("Premium status refresh failed: {}", err);
                self.cached()
            }
        }
    }
}
