//! Per-identifier sliding-window counters with single-writer semantics.
//!
//! Each counter key is handled by exactly one logical owner at a time: the
//! load-modify-store transaction runs under a per-key async mutex, so reads
//! and writes against one key form a total order while distinct keys
//! proceed fully in parallel.

mod store;
mod window;

pub use store::{CounterStore, MemoryCounterStore};
pub use window::{peek, slide, WindowDecision};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::Result;
use crate::fingerprint;
use crate::proxy::context::RequestContext;
use crate::rules::Rule;

/// Stable counter identity for a (rule, client) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterKey {
    pub key: String,
    /// The client-facing identifier: fingerprint hash, IP, or `default`.
    pub identifier: String,
}

impl CounterKey {
    /// Derive the key for a request under a rule: the fingerprint hash when
    /// the rule configures one, else the client IP, else a shared default
    /// bucket.
    pub fn derive(rule: &Rule, ctx: &RequestContext) -> Self {
        if let Some(spec) = &rule.fingerprint {
            if !spec.parameters.is_empty() {
                let hash = fingerprint::compute(ctx, &spec.parameters);
                return Self {
                    key: format!("rate_limit:{}:fingerprint:{}", rule.name, hash),
                    identifier: hash,
                };
            }
        }
        let ip = ctx.client_ip();
        if ip != "unknown" {
            return Self {
                key: format!("rate_limit:{}:ip:{}", rule.name, ip),
                identifier: ip,
            };
        }
        Self {
            key: format!("rate_limit:{}:default", rule.name),
            identifier: "default".to_string(),
        }
    }
}

/// Counter operations over a pluggable store, serialized per key.
pub struct CounterService {
    store: Arc<dyn CounterStore>,
    locks: DashMap<String, Arc<Mutex<()>>, ahash::RandomState>,
}

impl CounterService {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store, locks: DashMap::default() }
    }

    /// Record an arrival and decide. The whole load-modify-store runs under
    /// this key's lock; the mutation either commits fully or not at all.
    pub async fn check(&self, key: &str, limit: u64, period_secs: u64) -> Result<WindowDecision> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let stored = self.load_timestamps(key).await?;
        let decision = window::slide(stored, now_ms(), limit, period_secs);
        let serialized = serde_json::to_string(&decision.timestamps)?;
        self.store.store(key, &serialized).await?;
        Ok(decision)
    }

    /// Report the current budget without recording an arrival. A window
    /// whose every timestamp has aged out is evicted from the store.
    pub async fn peek(&self, key: &str, limit: u64, period_secs: u64) -> Result<WindowDecision> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let stored = self.load_timestamps(key).await?;
        let had_entries = !stored.is_empty();
        let decision = window::peek(stored, now_ms(), limit, period_secs);
        if had_entries && decision.timestamps.is_empty() {
            self.store.remove(key).await?;
        }
        Ok(decision)
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_default().clone()
    }

    async fn load_timestamps(&self, key: &str) -> Result<Vec<i64>> {
        let Some(raw) = self.store.load(key).await? else {
            return Ok(vec![]);
        };
        match serde_json::from_str(&raw) {
            Ok(list) => Ok(list),
            Err(e) => {
                warn!(key, error = %e, "corrupt counter entry, resetting window");
                Ok(vec![])
            }
        }
    }
}

/// Current wall time in epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
