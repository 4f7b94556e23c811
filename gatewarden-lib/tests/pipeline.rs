use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use gatewarden_lib::config::ConfigCache;
use gatewarden_lib::limiter::{CounterService, MemoryCounterStore};
use gatewarden_lib::proxy::forwarding::build_client;
use gatewarden_lib::proxy::{DefaultRateLimitPage, Pipeline};
use gatewarden_lib::rules::{MemoryRuleStore, RuleStore, Ruleset};

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type RespBody = BoxBody<Bytes, hyper::Error>;

const PEER: &str = "198.51.100.77:43210";

/// Minimal origin that answers 200 "origin" and marks its responses.
async fn spawn_origin() -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let svc = hyper::service::service_fn(|_req: Request<Incoming>| async move {
                    let body = Full::new(Bytes::from("origin"))
                        .map_err(|never: std::convert::Infallible| -> hyper::Error { match never {} })
                        .boxed();
                    let resp = Response::builder()
                        .status(StatusCode::OK)
                        .header("x-origin", "true")
                        .body(body)
                        .expect("origin response");
                    Ok::<_, hyper::Error>(resp)
                });
                let _ = ConnBuilder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });
    Ok(addr)
}

async fn pipeline_with(
    origin: SocketAddr,
    rules: Value,
    body_buffer_bytes: usize,
) -> Result<Pipeline, Box<dyn std::error::Error + Send + Sync>> {
    let ruleset: Ruleset = serde_json::from_value(rules)?;
    let store: Arc<dyn RuleStore> = Arc::new(MemoryRuleStore::with_ruleset(&ruleset)?);
    let cache = Arc::new(ConfigCache::new(store, Duration::from_secs(60)));
    let counters = Arc::new(CounterService::new(Arc::new(MemoryCounterStore::new())));
    Ok(Pipeline::new(
        cache,
        counters,
        build_client(),
        origin.to_string(),
        Arc::new(DefaultRateLimitPage),
        "/rate-limit-info".to_string(),
        body_buffer_bytes,
        None,
    ))
}

fn request(method: &str, uri: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "edge.example.com")
        .body(Full::new(Bytes::new()))
        .expect("request")
}

async fn body_string(resp: Response<RespBody>) -> String {
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn header<'a>(resp: &'a Response<RespBody>, name: &str) -> Option<&'a str> {
    resp.headers().get(name).and_then(|v| v.to_str().ok())
}

fn rate_limit_ruleset(limit: u64, period: u64) -> Value {
    json!({
        "version": "1.0",
        "rules": [{
            "name": "api",
            "rateLimit": {"limit": limit, "period": period},
            "initialMatch": {
                "conditions": [
                    {"field": "url.pathname", "operator": "starts_with", "value": "/api"}
                ],
                "logic": "and",
                "action": {"type": "rateLimit"}
            }
        }]
    })
}

#[tokio::test]
async fn four_requests_three_pass_then_429() -> TestResult {
    let origin = spawn_origin().await?;
    let pipeline = pipeline_with(origin, rate_limit_ruleset(3, 10), 512 * 1024).await?;
    let peer: SocketAddr = PEER.parse()?;

    for i in 0..3 {
        let resp = pipeline.handle(request("GET", "/api/x"), peer).await;
        assert_eq!(resp.status(), StatusCode::OK, "request {i}");
        assert_eq!(header(&resp, "x-rate-limit-limit"), Some("3"));
        assert_eq!(
            header(&resp, "x-rate-limit-remaining"),
            Some((2 - i).to_string().as_str())
        );
        assert_eq!(header(&resp, "x-rate-limit-period"), Some("10"));
        assert!(header(&resp, "x-client-identifier").is_some());
    }

    let denied = pipeline.handle(request("GET", "/api/x"), peer).await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = header(&denied, "retry-after").expect("retry-after").parse()?;
    assert!(retry_after >= 7, "retry-after was {retry_after}");
    assert_eq!(
        header(&denied, "content-type"),
        Some("application/json")
    );
    let doc: Value = serde_json::from_str(&body_string(denied).await)?;
    assert_eq!(doc["error"], "Rate limit exceeded");
    assert!(doc["retryAfter"].as_u64().is_some());
    Ok(())
}

#[tokio::test]
async fn distinct_user_agents_get_distinct_budgets() -> TestResult {
    let origin = spawn_origin().await?;
    let rules = json!({
        "version": "1.0",
        "rules": [{
            "name": "per-ua",
            "rateLimit": {"limit": 1, "period": 60},
            "fingerprint": {"parameters": ["clientIP", "headers.user-agent"]},
            "initialMatch": {
                "conditions": [
                    {"field": "url.pathname", "operator": "starts_with", "value": "/api"}
                ],
                "logic": "and",
                "action": {"type": "rateLimit"}
            }
        }]
    });
    let pipeline = pipeline_with(origin, rules, 512 * 1024).await?;
    let peer: SocketAddr = PEER.parse()?;

    let with_ua = |ua: &str| {
        Request::builder()
            .method("GET")
            .uri("/api/x")
            .header("host", "edge.example.com")
            .header("user-agent", ua)
            .body(Full::new(Bytes::new()))
            .expect("request")
    };

    // Same IP, two user agents: two independent windows.
    let first = pipeline.handle(with_ua("curl/8.5.0"), peer).await;
    assert_eq!(first.status(), StatusCode::OK);
    let second = pipeline.handle(with_ua("Mozilla/5.0"), peer).await;
    assert_eq!(second.status(), StatusCode::OK);

    // The first agent's window is now full.
    let third = pipeline.handle(with_ua("curl/8.5.0"), peer).await;
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}

#[tokio::test]
async fn log_rule_observes_while_block_rule_enforces() -> TestResult {
    let origin = spawn_origin().await?;
    let rules = json!({
        "version": "1.0",
        "rules": [
            {
                "name": "obs",
                "rateLimit": {"limit": 100, "period": 60},
                "initialMatch": {
                    "conditions": [
                        {"field": "url.pathname", "operator": "starts_with", "value": "/api"}
                    ],
                    "logic": "and",
                    "action": {"type": "log"}
                }
            },
            {
                "name": "enf",
                "rateLimit": {"limit": 1, "period": 60},
                "initialMatch": {
                    "conditions": [
                        {"field": "url.pathname", "operator": "starts_with", "value": "/api"}
                    ],
                    "logic": "and",
                    "action": {"type": "block"}
                }
            }
        ]
    });
    let pipeline = pipeline_with(origin, rules, 512 * 1024).await?;
    let peer: SocketAddr = PEER.parse()?;

    let first = pipeline.handle(request("GET", "/api/x"), peer).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = pipeline.handle(request("GET", "/api/x"), peer).await;
    assert_eq!(second.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_string(second).await, "Forbidden");
    Ok(())
}

#[tokio::test]
async fn custom_response_serves_configured_body() -> TestResult {
    let origin = spawn_origin().await?;
    let rules = json!({
        "version": "1.0",
        "rules": [{
            "name": "teapot",
            "rateLimit": {"limit": 1, "period": 60},
            "initialMatch": {
                "conditions": [
                    {"field": "url.pathname", "operator": "eq", "value": "/brew"}
                ],
                "logic": "and",
                "action": {"type": "customResponse", "statusCode": 418, "body": "tea", "bodyType": "text"}
            }
        }]
    });
    let pipeline = pipeline_with(origin, rules, 512 * 1024).await?;
    let peer: SocketAddr = PEER.parse()?;

    let first = pipeline.handle(request("GET", "/brew"), peer).await;
    assert_eq!(first.status(), StatusCode::OK);

    let denied = pipeline.handle(request("GET", "/brew"), peer).await;
    assert_eq!(denied.status(), StatusCode::from_u16(418)?);
    assert_eq!(header(&denied, "content-type"), Some("text/plain"));
    assert_eq!(header(&denied, "x-rate-limit-limit"), Some("1"));
    assert!(header(&denied, "retry-after").is_some());
    assert_eq!(body_string(denied).await, "tea");
    Ok(())
}

#[tokio::test]
async fn simulate_forwards_and_marks_both_sides() -> TestResult {
    let origin = spawn_origin().await?;
    let rules = json!({
        "version": "1.0",
        "rules": [{
            "name": "dry-run",
            "rateLimit": {"limit": 1, "period": 60},
            "initialMatch": {
                "conditions": [
                    {"field": "url.pathname", "operator": "starts_with", "value": "/api"}
                ],
                "logic": "and",
                "action": {"type": "simulate"}
            }
        }]
    });
    let pipeline = pipeline_with(origin, rules, 512 * 1024).await?;
    let peer: SocketAddr = PEER.parse()?;

    let under = pipeline.handle(request("GET", "/api/x"), peer).await;
    assert_eq!(under.status(), StatusCode::OK);
    assert_eq!(header(&under, "x-rate-limit-simulated"), Some("false"));
    assert_eq!(header(&under, "x-origin"), Some("true"));

    let over = pipeline.handle(request("GET", "/api/x"), peer).await;
    assert_eq!(over.status(), StatusCode::OK);
    assert_eq!(header(&over, "x-rate-limit-simulated"), Some("true"));
    assert_eq!(header(&over, "x-origin"), Some("true"));
    Ok(())
}

#[tokio::test]
async fn empty_ruleset_passes_everything_through() -> TestResult {
    let origin = spawn_origin().await?;
    let pipeline =
        pipeline_with(origin, json!({"version": "1.0", "rules": []}), 512 * 1024).await?;
    let peer: SocketAddr = PEER.parse()?;

    let resp = pipeline.handle(request("GET", "/anything"), peer).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(header(&resp, "x-rate-limit-limit").is_none());
    assert_eq!(body_string(resp).await, "origin");
    Ok(())
}

#[tokio::test]
async fn html_clients_get_the_rate_limit_page() -> TestResult {
    let origin = spawn_origin().await?;
    let pipeline = pipeline_with(origin, rate_limit_ruleset(1, 60), 512 * 1024).await?;
    let peer: SocketAddr = PEER.parse()?;

    pipeline.handle(request("GET", "/api/x"), peer).await;

    let req = Request::builder()
        .method("GET")
        .uri("/api/x")
        .header("host", "edge.example.com")
        .header("accept", "text/html,application/xhtml+xml")
        .body(Full::new(Bytes::new()))?;
    let denied = pipeline.handle(req, peer).await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&denied, "content-type"), Some("text/html"));
    let body = body_string(denied).await;
    assert!(body.contains("Rate limit exceeded"));
    Ok(())
}

#[tokio::test]
async fn introspection_reports_without_consuming() -> TestResult {
    let origin = spawn_origin().await?;
    // Catch-all rule so the info path itself resolves to a rule.
    let rules = json!({
        "version": "1.0",
        "rules": [{
            "name": "everything",
            "rateLimit": {"limit": 3, "period": 10},
            "initialMatch": {
                "conditions": [
                    {"field": "url.pathname", "operator": "starts_with", "value": "/"}
                ],
                "logic": "and",
                "action": {"type": "rateLimit"}
            }
        }]
    });
    let pipeline = pipeline_with(origin, rules, 512 * 1024).await?;
    let peer: SocketAddr = PEER.parse()?;

    for _ in 0..4 {
        let info = pipeline.handle(request("GET", "/rate-limit-info"), peer).await;
        assert_eq!(info.status(), StatusCode::OK);
        let doc: Value = serde_json::from_str(&body_string(info).await)?;
        assert_eq!(doc["limit"], json!(3));
        assert_eq!(doc["remaining"], json!(3));
        assert_eq!(doc["period"], json!(10));
        assert!(doc["resetFormatted"].is_string());
    }

    // Introspection consumed nothing: the full budget is still there.
    for _ in 0..3 {
        let resp = pipeline.handle(request("GET", "/data"), peer).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let denied = pipeline.handle(request("GET", "/data"), peer).await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}

#[tokio::test]
async fn body_buffer_truncates_at_the_cap() -> TestResult {
    let origin = spawn_origin().await?;
    let rules = json!({
        "version": "1.0",
        "rules": [{
            "name": "by-body",
            "rateLimit": {"limit": 1, "period": 60},
            "fingerprint": {"parameters": ["body"]},
            "initialMatch": {
                "conditions": [
                    {"field": "url.pathname", "operator": "eq", "value": "/submit"}
                ],
                "logic": "and",
                "action": {"type": "rateLimit"}
            }
        }]
    });
    // Tiny cap: bodies that agree on the first 8 bytes are the same client.
    let pipeline = pipeline_with(origin, rules, 8).await?;
    let peer: SocketAddr = PEER.parse()?;

    let with_body = |body: &'static str| {
        Request::builder()
            .method("POST")
            .uri("/submit")
            .header("host", "edge.example.com")
            .body(Full::new(Bytes::from(body)))
            .expect("request")
    };

    let first = pipeline.handle(with_body("AAAAAAAA-tail-one"), peer).await;
    assert_eq!(first.status(), StatusCode::OK);

    // Differs only past the cap: same fingerprint, so the window is shared.
    let second = pipeline.handle(with_body("AAAAAAAA-tail-two"), peer).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    // Differs inside the cap: fresh window.
    let third = pipeline.handle(with_body("BBBBBBBB-tail-one"), peer).await;
    assert_eq!(third.status(), StatusCode::OK);
    Ok(())
}
