use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::rules::{RuleStore, Ruleset};

struct CacheState {
    snapshot: Option<Arc<Ruleset>>,
    fetched_at: Option<Instant>,
}

/// Process-wide read-mostly ruleset snapshot.
///
/// Readers always see a self-consistent ruleset; refreshes swap the whole
/// snapshot at once. A failed refresh keeps the previous snapshot serving
/// (fail-stale) and waits out another TTL before retrying, so a flapping
/// rule store never turns into client-visible errors.
pub struct ConfigCache {
    store: Arc<dyn RuleStore>,
    ttl: Duration,
    inner: RwLock<CacheState>,
}

impl ConfigCache {
    pub fn new(store: Arc<dyn RuleStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            inner: RwLock::new(CacheState { snapshot: None, fetched_at: None }),
        }
    }

    /// Current snapshot, refreshing read-through when the TTL has lapsed.
    /// `None` means no ruleset exists; the pipeline passes everything
    /// through.
    pub async fn snapshot(&self) -> Option<Arc<Ruleset>> {
        {
            let state = self.inner.read().await;
            if let Some(fetched_at) = state.fetched_at {
                if fetched_at.elapsed() < self.ttl {
                    return state.snapshot.clone();
                }
            }
        }

        let mut state = self.inner.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(fetched_at) = state.fetched_at {
            if fetched_at.elapsed() < self.ttl {
                return state.snapshot.clone();
            }
        }

        match self.store.load().await {
            Ok(ruleset) => {
                debug!(rules = ruleset.as_ref().map_or(0, |r| r.rules.len()), "ruleset refreshed");
                state.snapshot = ruleset.map(Arc::new);
            }
            Err(e) => {
                warn!(error = %e, "ruleset refresh failed, serving stale snapshot");
            }
        }
        state.fetched_at = Some(Instant::now());
        state.snapshot.clone()
    }

    /// Force the next read to refresh, e.g. after an admin write.
    pub async fn invalidate(&self) {
        let mut state = self.inner.write().await;
        state.fetched_at = None;
    }
}
