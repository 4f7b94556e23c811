//! Client fingerprinting: a stable SHA-256 over a selected subset of
//! request attributes.
//!
//! The digest identifies a client at the granularity the rule chooses. It
//! is pure on its inputs: the same request, parameter list, and edge
//! metadata always produce the same hash, on every replica. Wall time is
//! never an input.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::matching::fields;
use crate::proxy::context::{json_path, RequestContext};

/// Compute the fingerprint for a request: each parameter is resolved to a
/// string (empty when absent), the components are joined with `|`, and the
/// result is hashed. Unknown parameters contribute an empty component and
/// log a warning.
pub fn compute(ctx: &RequestContext, parameters: &[String]) -> String {
    let components: Vec<String> = parameters
        .iter()
        .map(|p| resolve_parameter(ctx, p))
        .collect();
    let joined = components.join("|");
    hex::encode(Sha256::digest(joined.as_bytes()))
}

/// Parameter resolution dispatch. Beyond the shared field namespace, the
/// fingerprinter understands header/cookie equality forms configured inline
/// in the specifier:
///
/// - `headers.nameValue:<name>:<value>` yields `"<name>:<value>"` when the
///   header equals the configured value, else empty
/// - `headers.cookieName:<name>` yields the cookie value when present
/// - `headers.cookieNameValue:<name>:<value>` yields `"<name>:<value>"`
///   when the cookie equals the configured value, else empty
fn resolve_parameter(ctx: &RequestContext, param: &str) -> String {
    match param {
        "clientIP" => ctx.client_ip(),
        "method" => ctx.method.to_string(),
        "url" => ctx.url(),
        "body" => {
            // The body contributes as a digest of the buffered bytes, so
            // oversized bodies stay cheap to join.
            hex::encode(Sha256::digest(&ctx.body))
        }
        _ => {
            if let Some(spec) = param.strip_prefix("headers.nameValue:") {
                let (name, value) = split_pair(spec);
                match ctx.header(name) {
                    Some(actual) if actual == value => format!("{name}:{value}"),
                    _ => String::new(),
                }
            } else if let Some(name) = param.strip_prefix("headers.cookieName:") {
                ctx.cookie(name).unwrap_or_default()
            } else if let Some(spec) = param.strip_prefix("headers.cookieNameValue:") {
                let (name, value) = split_pair(spec);
                match ctx.cookie(name) {
                    Some(actual) if actual == value => format!("{name}:{value}"),
                    _ => String::new(),
                }
            } else if let Some(name) = param.strip_prefix("headers.") {
                ctx.header(name).unwrap_or_default()
            } else if let Some(prop) = param.strip_prefix("url.") {
                ctx.url_part(prop).unwrap_or_default()
            } else if let Some(path) = param.strip_prefix("cf.") {
                ctx.edge
                    .lookup(path)
                    .and_then(fields::value_as_string)
                    .unwrap_or_default()
            } else if let Some(path) = param.strip_prefix("body.") {
                match ctx.body_json() {
                    Some(doc) => json_path(&doc, path)
                        .and_then(fields::value_as_string)
                        .unwrap_or_default(),
                    // Non-JSON bodies fall through to plain text.
                    None => ctx.body_text(),
                }
            } else {
                warn!(parameter = %param, "unknown fingerprint parameter");
                String::new()
            }
        }
    }
}

fn split_pair(spec: &str) -> (&str, &str) {
    spec.split_once(':').unwrap_or((spec, ""))
}
