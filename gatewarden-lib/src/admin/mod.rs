//! Administrative API: rule CRUD over the rule store, plus Prometheus
//! metrics. Runs on its own listener so policy management never shares a
//! port with client traffic.

pub mod handlers;

pub use handlers::AdminState;

use std::net::SocketAddr;
use std::sync::Arc;

use http::{Method, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::error::Result;
use crate::proxy::forwarding::RespBody;
use crate::telemetry::handle_metrics;

pub async fn run(
    addr: SocketAddr,
    state: Arc<AdminState>,
    registry: Option<Arc<Registry>>,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(?addr, "admin API listening");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("admin API: shutdown signal received");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "admin accept error");
                        continue;
                    }
                };

                let state = state.clone();
                let registry = registry.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let state = state.clone();
                        let registry = registry.clone();
                        async move {
                            Ok::<_, hyper::Error>(route(req, &state, registry.as_deref()).await)
                        }
                    });

                    let builder = ConnBuilder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "admin serve_connection error");
                    }
                });
            }
        }
    }

    info!("admin API stopped");
    Ok(())
}

async fn route(
    req: Request<Incoming>,
    state: &AdminState,
    registry: Option<&Registry>,
) -> Response<RespBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return handlers::error_response(
                StatusCode::BAD_REQUEST,
                "Failed to read request body",
                Some(e.to_string()),
            );
        }
    };

    match path.as_str() {
        "/config" => match method {
            Method::GET => handlers::get_config(state).await,
            Method::POST => handlers::post_config(state, body).await,
            _ => method_not_allowed(),
        },
        "/config/reorder" => match method {
            Method::PUT => handlers::reorder_config(state, body).await,
            _ => method_not_allowed(),
        },
        "/rules" => match method {
            Method::POST => handlers::post_rule(state, body).await,
            _ => method_not_allowed(),
        },
        "/metrics" => match (method, registry) {
            (Method::GET, Some(registry)) => handle_metrics(registry)
                .unwrap_or_else(|_| {
                    handlers::error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to encode metrics",
                        None,
                    )
                }),
            (Method::GET, None) => {
                handlers::error_response(StatusCode::NOT_FOUND, "Metrics disabled", None)
            }
            _ => method_not_allowed(),
        },
        _ => {
            if let Some(name) = path.strip_prefix("/rules/") {
                if name.is_empty() || name.contains('/') {
                    return handlers::error_response(StatusCode::NOT_FOUND, "Not found", None);
                }
                return match method {
                    Method::GET => handlers::get_rule(state, name).await,
                    Method::PUT => handlers::put_rule(state, name, body).await,
                    Method::DELETE => handlers::delete_rule(state, name).await,
                    _ => method_not_allowed(),
                };
            }
            handlers::error_response(StatusCode::NOT_FOUND, "Not found", None)
        }
    }
}

fn method_not_allowed() -> Response<RespBody> {
    handlers::error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed", None)
}
