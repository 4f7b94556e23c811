mod normalize;
mod store;
mod types;

pub use normalize::{normalize_rule, normalize_ruleset};
pub use store::{MemoryRuleStore, RuleStore};
pub use types::{
    validate_rule, Action, BodyType, Condition, ConditionGroup, ConditionLeaf, FingerprintSpec,
    GroupTag, Logic, MatchBlock, Operator, RateLimit, Rule, Ruleset,
};
