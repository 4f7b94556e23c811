use serde::{Deserialize, Serialize};

/// A named policy unit: match conditions plus the action taken when the
/// client's counter is over its limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Unique name within the ruleset
    pub name: String,
    pub rate_limit: RateLimit,
    /// Which request attributes identify a client. When absent, the client
    /// IP is the identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<FingerprintSpec>,
    pub initial_match: MatchBlock,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub else_if_actions: Vec<MatchBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub else_action: Option<Action>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RateLimit {
    /// Maximum requests inside the sliding window
    pub limit: u64,
    /// Window length in seconds
    pub period: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FingerprintSpec {
    /// Ordered list of parameter specifiers, e.g. `clientIP`,
    /// `headers.user-agent`, `cf.asn`, `body.user.id`
    pub parameters: Vec<String>,
}

/// One conditions-plus-action block: the rule's `initialMatch` or one of its
/// `elseIfActions` entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchBlock {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub logic: Logic,
    pub action: Action,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    #[default]
    And,
    Or,
}

/// A condition tree node: either a leaf comparison or a nested group.
///
/// Groups carry `type: "group"`; leaves are recognized by their
/// `field`/`operator` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Condition {
    Group(ConditionGroup),
    Leaf(ConditionLeaf),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionGroup {
    #[serde(rename = "type")]
    pub kind: GroupTag,
    #[serde(default)]
    pub logic: Logic,
    pub conditions: Vec<Condition>,
}

/// Marker that forces `type: "group"` on group nodes during deserialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupTag {
    #[default]
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionLeaf {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_name: Option<String>,
}

/// Comparison operators. Operators not in this set deserialize to `Unknown`
/// and evaluate the leaf to false rather than failing the whole ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Matches,
    Unknown,
}

impl Operator {
    pub fn from_name(name: &str) -> Self {
        match name {
            "eq" => Operator::Eq,
            "ne" => Operator::Ne,
            "gt" => Operator::Gt,
            "ge" => Operator::Ge,
            "lt" => Operator::Lt,
            "le" => Operator::Le,
            "contains" => Operator::Contains,
            "not_contains" => Operator::NotContains,
            "starts_with" => Operator::StartsWith,
            "ends_with" => Operator::EndsWith,
            "matches" => Operator::Matches,
            _ => Operator::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
            Operator::Matches => "matches",
            Operator::Unknown => "unknown",
        }
    }
}

impl Serialize for Operator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Operator::from_name(&name))
    }
}

/// What happens when a matched rule's counter says the client is over its
/// limit. `Log` and `Simulate` are observational: the rule walk continues
/// past them and the request is still forwarded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Allow,
    Log,
    Simulate,
    Block,
    RateLimit,
    #[serde(rename_all = "camelCase")]
    CustomResponse {
        status_code: u16,
        body: String,
        #[serde(default)]
        body_type: BodyType,
    },
}

impl Action {
    /// Terminal actions stop the rule walk; observational ones do not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Action::Log | Action::Simulate)
    }
}

/// Body shape of a custom response. Anything other than `json` or `html`
/// serves as plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    Json,
    Html,
    #[default]
    Text,
}

impl BodyType {
    pub fn content_type(&self) -> &'static str {
        match self {
            BodyType::Json => "application/json",
            BodyType::Html => "text/html",
            BodyType::Text => "text/plain",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            BodyType::Json => "json",
            BodyType::Html => "html",
            BodyType::Text => "text",
        }
    }
}

impl Serialize for BodyType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for BodyType {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(match name.as_str() {
            "json" => BodyType::Json,
            "html" => BodyType::Html,
            _ => BodyType::Text,
        })
    }
}

/// Ordered collection of rules. Order is significant: the first terminal
/// match wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ruleset {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for Ruleset {
    fn default() -> Self {
        Self { version: default_version(), rules: vec![] }
    }
}

/// Structural validation for a single rule. Invalid rules are skipped by the
/// matcher with a warning rather than failing the pipeline.
pub fn validate_rule(rule: &Rule) -> std::result::Result<(), String> {
    if rule.name.trim().is_empty() {
        return Err("rule name cannot be empty".into());
    }
    if rule.rate_limit.limit == 0 {
        return Err("rateLimit.limit must be > 0".into());
    }
    if rule.rate_limit.period == 0 {
        return Err("rateLimit.period must be > 0".into());
    }
    if !rule.else_if_actions.is_empty() && rule.else_action.is_none() {
        return Err("elseIfActions requires elseAction".into());
    }
    Ok(())
}
