use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;

/// Backing store for sliding-window counters. One entry per counter key;
/// the value is the JSON-serialized timestamp list. The host wires a
/// concrete implementation in (in-process map, KV namespace, ...).
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn store(&self, key: &str, value: &str) -> Result<()>;
    /// Drop an entry. Empty windows become eligible once their period has
    /// elapsed.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-process counter store on a concurrent map.
#[derive(Default)]
pub struct MemoryCounterStore {
    entries: DashMap<String, String, ahash::RandomState>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn store(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
