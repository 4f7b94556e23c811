use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::Request;
use hyper::Response;
use opentelemetry::KeyValue;
use serde_json::json;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::ConfigCache;
use crate::limiter::{CounterKey, CounterService};
use crate::matching::match_rules;
use crate::proxy::context::{EdgeMetadata, RequestContext};
use crate::proxy::dispatcher::{
    apply_rate_limit_headers, apply_simulated_header, dispatch, CounterVerdict, Dispatch,
};
use crate::proxy::forwarding::{
    bad_gateway, forward, full_body, internal_error, HttpClient, RespBody,
};
use crate::proxy::page::{format_reset, RateLimitPage};
use crate::rules::Action;
use crate::telemetry::Metrics;

/// The request path: config snapshot, rule match, fingerprint, counter,
/// dispatch, header decoration. Fail-open everywhere before dispatch: the
/// only 429 a client can ever see is a real over-limit counter verdict.
pub struct Pipeline {
    cache: Arc<ConfigCache>,
    counters: Arc<CounterService>,
    client: HttpClient,
    origin: String,
    page: Arc<dyn RateLimitPage>,
    info_path: String,
    body_buffer_bytes: usize,
    metrics: Option<Arc<Metrics>>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<ConfigCache>,
        counters: Arc<CounterService>,
        client: HttpClient,
        origin: String,
        page: Arc<dyn RateLimitPage>,
        info_path: String,
        body_buffer_bytes: usize,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self { cache, counters, client, origin, page, info_path, body_buffer_bytes, metrics }
    }

    pub async fn handle<B>(&self, req: Request<B>, peer: std::net::SocketAddr) -> Response<RespBody>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: std::fmt::Display,
    {
        let start = Instant::now();
        let method = req.method().to_string();

        let (parts, incoming) = req.into_parts();
        let body = match buffer_body(incoming, self.body_buffer_bytes).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to read request body");
                return internal_error();
            }
        };

        let ctx = RequestContext {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
            peer,
            body: body.clone(),
            edge: EdgeMetadata::from_peer(peer),
        };

        let resp = if ctx.uri.path() == self.info_path {
            self.handle_info(&ctx).await
        } else {
            self.run(parts, body, &ctx).await
        };

        if let Some(ref m) = self.metrics {
            let duration = start.elapsed().as_secs_f64();
            let attrs = [
                KeyValue::new("method", method),
                KeyValue::new("status_code", resp.status().as_u16().to_string()),
            ];
            m.requests_total.add(1, &attrs);
            m.requests_duration_seconds.record(duration, &attrs);
        }

        resp
    }

    async fn run(
        &self,
        parts: http::request::Parts,
        body: Bytes,
        ctx: &RequestContext,
    ) -> Response<RespBody> {
        let snapshot = self.cache.snapshot().await;
        let Some(ruleset) = snapshot.filter(|r| !r.rules.is_empty()) else {
            return self.forward_plain(parts, body).await;
        };

        let Some(matched) = match_rules(&ruleset, ctx) else {
            return self.forward_plain(parts, body).await;
        };
        if let Some(ref m) = self.metrics {
            m.rule_matches_total
                .add(1, &[KeyValue::new("rule", matched.rule.name.clone())]);
        }

        let key = CounterKey::derive(matched.rule, ctx);
        let rate = matched.rule.rate_limit;
        let decision = match self.counters.check(&key.key, rate.limit, rate.period).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(rule = %matched.rule.name, error = %e, "counter store failure, passing through");
                if let Some(ref m) = self.metrics {
                    m.counter_store_errors_total.add(1, &[]);
                }
                return self.forward_plain(parts, body).await;
            }
        };

        let verdict = CounterVerdict {
            decision,
            period_secs: rate.period,
            identifier: key.identifier,
        };

        if !verdict.decision.allowed {
            if let Some(ref m) = self.metrics {
                m.denials_total
                    .add(1, &[KeyValue::new("rule", matched.rule.name.clone())]);
            }
            if matches!(matched.action, Action::Log) {
                info!(
                    rule = %matched.rule.name,
                    identifier = %verdict.identifier,
                    method = %ctx.method,
                    path = %ctx.uri.path(),
                    "rate limit exceeded, logging only"
                );
            }
        }

        let accepts_html = ctx
            .header("accept")
            .is_some_and(|a| a.contains("text/html"));

        match dispatch(matched.action, &verdict, accepts_html, self.page.as_ref()) {
            Dispatch::Forward { simulated } => {
                let mut resp = match forward(parts, body, &self.client, &self.origin).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        warn!(error = %e, "origin fetch failed");
                        if let Some(ref m) = self.metrics {
                            m.origin_errors_total.add(1, &[]);
                        }
                        bad_gateway()
                    }
                };
                if let Some(simulated) = simulated {
                    apply_simulated_header(resp.headers_mut(), simulated);
                }
                apply_rate_limit_headers(resp.headers_mut(), &verdict);
                resp
            }
            Dispatch::Synthetic(mut resp) => {
                apply_rate_limit_headers(resp.headers_mut(), &verdict);
                resp
            }
        }
    }

    /// Pass-through: no matched rule, no decoration.
    async fn forward_plain(&self, parts: http::request::Parts, body: Bytes) -> Response<RespBody> {
        match forward(parts, body, &self.client, &self.origin).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "origin fetch failed");
                if let Some(ref m) = self.metrics {
                    m.origin_errors_total.add(1, &[]);
                }
                bad_gateway()
            }
        }
    }

    /// Introspection: report the caller's current budget for whichever rule
    /// would match it, without recording an arrival.
    async fn handle_info(&self, ctx: &RequestContext) -> Response<RespBody> {
        let accepts_html = ctx
            .header("accept")
            .is_some_and(|a| a.contains("text/html"));

        let snapshot = self.cache.snapshot().await;
        let matched = snapshot.as_deref().and_then(|rs| match_rules(rs, ctx));
        let Some(matched) = matched else {
            return json_message(hyper::StatusCode::OK, json!({"message": "No rate limit rule applies"}));
        };

        let key = CounterKey::derive(matched.rule, ctx);
        let rate = matched.rule.rate_limit;
        let decision = match self.counters.peek(&key.key, rate.limit, rate.period).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "counter store failure on introspection");
                return json_message(
                    hyper::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "Counter store unavailable"}),
                );
            }
        };

        let reset_secs = decision.reset_time_ms / 1000;
        let reset_formatted = format_reset(decision.reset_time_ms);
        if accepts_html {
            let html = format!(
                "<!DOCTYPE html>\n<html>\n<head><title>Rate limit status</title></head>\n<body>\n\
                 <h1>Rate limit status</h1>\n\
                 <p>Limit: {} requests per {} seconds</p>\n\
                 <p>Remaining: {}</p>\n\
                 <p>Resets at {}</p>\n\
                 </body>\n</html>\n",
                decision.limit, rate.period, decision.remaining, reset_formatted,
            );
            let mut resp = Response::new(full_body(Bytes::from(html)));
            resp.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("text/html"),
            );
            resp
        } else {
            json_message(
                hyper::StatusCode::OK,
                json!({
                    "limit": decision.limit,
                    "remaining": decision.remaining,
                    "reset": reset_secs,
                    "resetFormatted": reset_formatted,
                    "period": rate.period,
                }),
            )
        }
    }
}

fn json_message(status: hyper::StatusCode, value: serde_json::Value) -> Response<RespBody> {
    let mut resp = Response::new(full_body(Bytes::from(value.to_string())));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    resp
}

/// Buffer the request body, truncating exactly at `cap` bytes. The buffer
/// is the body every downstream stage sees, including the forwarded origin
/// request: the wire body is read at most once.
async fn buffer_body<B>(mut body: B, cap: usize) -> std::result::Result<Bytes, B::Error>
where
    B: Body<Data = Bytes> + Unpin,
{
    let mut buf = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = frame?;
        if let Some(data) = frame.data_ref() {
            let remaining = cap.saturating_sub(buf.len());
            if data.len() >= remaining {
                buf.extend_from_slice(&data[..remaining]);
                break;
            }
            buf.extend_from_slice(data);
        }
    }
    Ok(buf.freeze())
}
