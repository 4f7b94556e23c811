use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use hyper::header::{HeaderName, HeaderValue};
use serde_json::json;

use crate::limiter::WindowDecision;
use crate::proxy::forwarding::{full_body, RespBody};
use crate::proxy::page::RateLimitPage;
use crate::rules::Action;

/// Counter outcome plus the identity it was computed for, as the
/// dispatcher and the response headers need it.
#[derive(Debug, Clone)]
pub struct CounterVerdict {
    pub decision: WindowDecision,
    pub period_secs: u64,
    /// Fingerprint hash, client IP, or `default`
    pub identifier: String,
}

/// What the pipeline should do with the request after consulting the
/// counter: forward it (optionally marking the simulate header) or emit a
/// synthetic response.
pub enum Dispatch {
    Forward {
        /// `Some(v)` sets `X-Rate-Limit-Simulated: v` on the response
        simulated: Option<bool>,
    },
    Synthetic(Response<RespBody>),
}

/// Map the (action, counter verdict) pair into a dispatch decision.
/// `accepts_html` selects the page-vs-JSON shape of the default 429.
pub fn dispatch(
    action: &Action,
    verdict: &CounterVerdict,
    accepts_html: bool,
    page: &dyn RateLimitPage,
) -> Dispatch {
    if verdict.decision.allowed {
        let simulated = matches!(action, Action::Simulate).then_some(false);
        return Dispatch::Forward { simulated };
    }

    match action {
        // Allow bypasses enforcement entirely.
        Action::Allow => Dispatch::Forward { simulated: None },
        // The denial is logged by the pipeline; traffic still flows.
        Action::Log => Dispatch::Forward { simulated: None },
        Action::Simulate => Dispatch::Forward { simulated: Some(true) },
        Action::Block => {
            let mut resp = Response::new(full_body(Bytes::from("Forbidden")));
            *resp.status_mut() = StatusCode::FORBIDDEN;
            Dispatch::Synthetic(resp)
        }
        Action::CustomResponse { status_code, body, body_type } => {
            let mut resp = Response::new(full_body(Bytes::from(body.clone())));
            *resp.status_mut() =
                StatusCode::from_u16(*status_code).unwrap_or(StatusCode::TOO_MANY_REQUESTS);
            resp.headers_mut().insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static(body_type.content_type()),
            );
            Dispatch::Synthetic(resp)
        }
        Action::RateLimit => {
            let resp = if accepts_html {
                let html = page.render(verdict);
                let mut resp = Response::new(full_body(Bytes::from(html)));
                *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
                resp.headers_mut().insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("text/html"),
                );
                resp
            } else {
                let body = json!({
                    "error": "Rate limit exceeded",
                    "retryAfter": verdict.decision.retry_after_secs,
                });
                let mut resp = Response::new(full_body(Bytes::from(body.to_string())));
                *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
                resp.headers_mut().insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                resp
            };
            Dispatch::Synthetic(resp)
        }
    }
}

/// Merge the counter headers onto an outgoing response. Applied to every
/// response a matched rule produces, forwarded or synthetic.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, verdict: &CounterVerdict) {
    let d = &verdict.decision;
    insert(headers, "x-rate-limit-limit", d.limit.to_string());
    insert(headers, "x-rate-limit-remaining", d.remaining.to_string());
    insert(headers, "x-rate-limit-period", verdict.period_secs.to_string());
    insert(headers, "x-rate-limit-reset", (d.reset_time_ms / 1000).to_string());
    insert(
        headers,
        "x-rate-limit-reset-precise",
        format!("{:.3}", d.reset_time_ms as f64 / 1000.0),
    );
    insert(headers, "x-client-identifier", verdict.identifier.clone());
    if !d.allowed {
        insert(headers, "retry-after", d.retry_after_secs.to_string());
    }
}

/// Set the simulate observability marker.
pub fn apply_simulated_header(headers: &mut HeaderMap, simulated: bool) {
    insert(headers, "x-rate-limit-simulated", simulated.to_string());
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: String) {
    if let Ok(v) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static(name), v);
    }
}
