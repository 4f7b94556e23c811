use std::sync::Arc;

use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::proxy::pipeline::Pipeline;

/// Gateway accept loop: one task per connection, every request through the
/// pipeline. Stops on ctrl-c.
pub async fn run(settings: Arc<Settings>, pipeline: Arc<Pipeline>) -> Result<()> {
    let listener = TcpListener::bind(settings.listen).await?;
    let builder = ConnBuilder::new(TokioExecutor::new());

    info!(addr = ?settings.listen, origin = %settings.origin, "gateway listening");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                let pipeline = pipeline.clone();
                let builder = builder.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let pipeline = pipeline.clone();
                        async move {
                            Ok::<_, hyper::Error>(pipeline.handle(req, peer).await)
                        }
                    });

                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "serve_connection error");
                    }
                });
            }
        }
    }

    info!("gateway stopped");
    Ok(())
}
