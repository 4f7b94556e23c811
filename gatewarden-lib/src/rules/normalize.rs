use serde_json::Value;

/// Coerce numeric rule fields that clients send as JSON strings into
/// numbers: `rateLimit.limit`, `rateLimit.period`, `action.statusCode`.
/// Applying the pass twice is a no-op.
pub fn normalize_ruleset(doc: &mut Value) {
    if let Some(rules) = doc.get_mut("rules").and_then(Value::as_array_mut) {
        for rule in rules {
            normalize_rule(rule);
        }
    }
}

/// Normalize a single rule document in place.
pub fn normalize_rule(rule: &mut Value) {
    if let Some(rate_limit) = rule.get_mut("rateLimit") {
        coerce_number(rate_limit, "limit");
        coerce_number(rate_limit, "period");
    }
    if let Some(block) = rule.get_mut("initialMatch") {
        normalize_action(block.get_mut("action"));
    }
    if let Some(blocks) = rule.get_mut("elseIfActions").and_then(Value::as_array_mut) {
        for block in blocks {
            normalize_action(block.get_mut("action"));
        }
    }
    normalize_action(rule.get_mut("elseAction"));
}

fn normalize_action(action: Option<&mut Value>) {
    if let Some(action) = action {
        coerce_number(action, "statusCode");
    }
}

fn coerce_number(obj: &mut Value, key: &str) {
    let Some(v) = obj.get_mut(key) else {
        return;
    };
    if let Value::String(s) = v {
        if let Ok(n) = s.trim().parse::<u64>() {
            *v = Value::from(n);
        }
    }
}
