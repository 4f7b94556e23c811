use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{GatewayError, Result};
use crate::rules::types::Ruleset;

/// Backing store for the ruleset document. The host wires a concrete
/// implementation in; the gateway only ever reads and replaces the whole
/// document.
///
/// The persisted value is the JSON-serialized ruleset under a single
/// `config` entry.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Load the current ruleset. `None` means no ruleset has been stored
    /// yet, which the pipeline treats as pass-through.
    async fn load(&self) -> Result<Option<Ruleset>>;

    /// Replace the whole ruleset document.
    async fn save(&self, ruleset: &Ruleset) -> Result<()>;
}

/// In-process rule store holding the serialized config document.
#[derive(Default)]
pub struct MemoryRuleStore {
    config: RwLock<Option<String>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an initial ruleset, e.g. from a file at startup.
    pub fn with_ruleset(ruleset: &Ruleset) -> Result<Self> {
        let doc = serde_json::to_string(ruleset)?;
        Ok(Self { config: RwLock::new(Some(doc)) })
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn load(&self) -> Result<Option<Ruleset>> {
        let guard = self.config.read().await;
        match guard.as_deref() {
            Some(doc) => {
                let ruleset = serde_json::from_str(doc)
                    .map_err(|e| GatewayError::RuleStore(format!("corrupt config entry: {e}")))?;
                Ok(Some(ruleset))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, ruleset: &Ruleset) -> Result<()> {
        let doc = serde_json::to_string(ruleset)?;
        *self.config.write().await = Some(doc);
        Ok(())
    }
}
