use std::sync::Arc;

use bytes::Bytes;
use hyper::{Response, StatusCode};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::ConfigCache;
use crate::proxy::forwarding::{full_body, RespBody};
use crate::rules::{normalize_rule, normalize_ruleset, Rule, RuleStore, Ruleset};

/// Shared state for the admin handlers: write-through rule store plus the
/// snapshot cache to invalidate after mutations.
pub struct AdminState {
    pub store: Arc<dyn RuleStore>,
    pub cache: Arc<ConfigCache>,
}

pub async fn get_config(state: &AdminState) -> Response<RespBody> {
    match state.store.load().await {
        Ok(ruleset) => json_ok(&ruleset.unwrap_or_default()),
        Err(e) => store_error(e),
    }
}

pub async fn post_config(state: &AdminState, body: Bytes) -> Response<RespBody> {
    let mut doc: Value = match serde_json::from_slice(&body) {
        Ok(doc) => doc,
        Err(e) => return bad_request("Invalid JSON", Some(e.to_string())),
    };
    normalize_ruleset(&mut doc);

    if let Some(version) = doc.get("version").and_then(Value::as_str) {
        if version != "1.0" {
            return bad_request("Unsupported config version", Some(version.to_string()));
        }
    }

    let ruleset: Ruleset = match serde_json::from_value(doc) {
        Ok(ruleset) => ruleset,
        Err(e) => return bad_request("Invalid config document", Some(e.to_string())),
    };

    if let Err(e) = state.store.save(&ruleset).await {
        return store_error(e);
    }
    state.cache.invalidate().await;
    info!(rules = ruleset.rules.len(), "config replaced");
    json_ok(&ruleset)
}

pub async fn get_rule(state: &AdminState, name: &str) -> Response<RespBody> {
    let ruleset = match state.store.load().await {
        Ok(ruleset) => ruleset.unwrap_or_default(),
        Err(e) => return store_error(e),
    };
    match ruleset.rules.iter().find(|r| r.name == name) {
        Some(rule) => json_ok(rule),
        None => not_found(name),
    }
}

pub async fn post_rule(state: &AdminState, body: Bytes) -> Response<RespBody> {
    let rule = match parse_rule(&body) {
        Ok(rule) => rule,
        Err(resp) => return *resp,
    };

    let mut ruleset = match state.store.load().await {
        Ok(ruleset) => ruleset.unwrap_or_default(),
        Err(e) => return store_error(e),
    };
    if ruleset.rules.iter().any(|r| r.name == rule.name) {
        return bad_request("Rule name already exists", Some(rule.name));
    }
    ruleset.rules.push(rule.clone());

    if let Err(e) = state.store.save(&ruleset).await {
        return store_error(e);
    }
    state.cache.invalidate().await;
    info!(rule = %rule.name, "rule appended");
    json_response(StatusCode::CREATED, &rule)
}

pub async fn put_rule(state: &AdminState, name: &str, body: Bytes) -> Response<RespBody> {
    let rule = match parse_rule(&body) {
        Ok(rule) => rule,
        Err(resp) => return *resp,
    };

    let mut ruleset = match state.store.load().await {
        Ok(ruleset) => ruleset.unwrap_or_default(),
        Err(e) => return store_error(e),
    };
    let Some(idx) = ruleset.rules.iter().position(|r| r.name == name) else {
        return not_found(name);
    };
    ruleset.rules[idx] = rule.clone();

    if let Err(e) = state.store.save(&ruleset).await {
        return store_error(e);
    }
    state.cache.invalidate().await;
    info!(rule = %name, "rule replaced");
    json_ok(&rule)
}

pub async fn delete_rule(state: &AdminState, name: &str) -> Response<RespBody> {
    let mut ruleset = match state.store.load().await {
        Ok(ruleset) => ruleset.unwrap_or_default(),
        Err(e) => return store_error(e),
    };
    let Some(idx) = ruleset.rules.iter().position(|r| r.name == name) else {
        return not_found(name);
    };
    ruleset.rules.remove(idx);

    if let Err(e) = state.store.save(&ruleset).await {
        return store_error(e);
    }
    state.cache.invalidate().await;
    info!(rule = %name, "rule deleted");
    json_ok(&json!({ "deleted": name }))
}

/// Reorder the ruleset. The incoming rule list must be a permutation of
/// the stored one: no additions, no deletions.
pub async fn reorder_config(state: &AdminState, body: Bytes) -> Response<RespBody> {
    let mut doc: Value = match serde_json::from_slice(&body) {
        Ok(doc) => doc,
        Err(e) => return bad_request("Invalid JSON", Some(e.to_string())),
    };
    normalize_ruleset(&mut doc);
    let rules: Vec<Rule> = match doc
        .get_mut("rules")
        .map(Value::take)
        .map(serde_json::from_value)
    {
        Some(Ok(rules)) => rules,
        Some(Err(e)) => return bad_request("Invalid rules", Some(e.to_string())),
        None => return bad_request("Missing rules array", None),
    };

    let mut ruleset = match state.store.load().await {
        Ok(ruleset) => ruleset.unwrap_or_default(),
        Err(e) => return store_error(e),
    };

    let mut current: Vec<&str> = ruleset.rules.iter().map(|r| r.name.as_str()).collect();
    let mut incoming: Vec<&str> = rules.iter().map(|r| r.name.as_str()).collect();
    current.sort_unstable();
    incoming.sort_unstable();
    if current != incoming {
        return bad_request("Reorder must preserve the rule set", None);
    }

    ruleset.rules = rules;
    if let Err(e) = state.store.save(&ruleset).await {
        return store_error(e);
    }
    state.cache.invalidate().await;
    info!("ruleset reordered");
    json_ok(&ruleset)
}

fn parse_rule(body: &Bytes) -> std::result::Result<Rule, Box<Response<RespBody>>> {
    let mut doc: Value = serde_json::from_slice(body)
        .map_err(|e| Box::new(bad_request("Invalid JSON", Some(e.to_string()))))?;
    normalize_rule(&mut doc);
    serde_json::from_value(doc)
        .map_err(|e| Box::new(bad_request("Invalid rule document", Some(e.to_string()))))
}

pub fn json_ok<T: serde::Serialize>(value: &T) -> Response<RespBody> {
    json_response(StatusCode::OK, value)
}

pub fn json_response<T: serde::Serialize>(status: StatusCode, value: &T) -> Response<RespBody> {
    let body = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let mut resp = Response::new(full_body(Bytes::from(body)));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    resp
}

pub fn error_response(
    status: StatusCode,
    error: &str,
    details: Option<String>,
) -> Response<RespBody> {
    let mut envelope = json!({ "error": error });
    if let Some(details) = details {
        envelope["details"] = Value::String(details);
    }
    json_response(status, &envelope)
}

fn bad_request(error: &str, details: Option<String>) -> Response<RespBody> {
    error_response(StatusCode::BAD_REQUEST, error, details)
}

fn not_found(name: &str) -> Response<RespBody> {
    error_response(StatusCode::NOT_FOUND, "Rule not found", Some(name.to_string()))
}

fn store_error(e: crate::error::GatewayError) -> Response<RespBody> {
    warn!(error = %e, "rule store failure");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Rule store unavailable", None)
}
