use serde_json::Value;
use tracing::warn;

use crate::proxy::context::{json_path, RequestContext};

/// Resolve a field name from the request namespace: `clientIP`, `method`,
/// `url`, `url.<prop>`, `headers.<name>`, `cf.<dotted-path>`, `body`,
/// `body.<path>`. A recognized field whose value is absent or null
/// resolves to the empty string; `None` means the field name itself is
/// unrecognized.
pub fn resolve(ctx: &RequestContext, field: &str) -> Option<String> {
    match field {
        "clientIP" => Some(ctx.client_ip()),
        "method" => Some(ctx.method.to_string()),
        "url" => Some(ctx.url()),
        "body" => Some(ctx.body_text()),
        _ => {
            if let Some(prop) = field.strip_prefix("url.") {
                ctx.url_part(prop)
            } else if let Some(name) = field.strip_prefix("headers.") {
                Some(ctx.header(name).unwrap_or_default())
            } else if let Some(path) = field.strip_prefix("cf.") {
                Some(
                    ctx.edge
                        .lookup(path)
                        .and_then(value_as_string)
                        .unwrap_or_default(),
                )
            } else if let Some(path) = field.strip_prefix("body.") {
                // Non-JSON bodies fall through to the plain text body.
                match ctx.body_json() {
                    Some(doc) => Some(
                        json_path(&doc, path)
                            .and_then(value_as_string)
                            .unwrap_or_default(),
                    ),
                    None => Some(ctx.body_text()),
                }
            } else {
                warn!(field, "unknown field in condition");
                None
            }
        }
    }
}

/// Stringify a JSON value for comparison. Null counts as absent.
pub fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Stringify a condition operand. Null becomes the empty string.
pub fn operand_as_string(v: &Value) -> String {
    value_as_string(v).unwrap_or_default()
}
