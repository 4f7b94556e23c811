use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::{GatewayError, Result};

/// Outbound bodies are always the buffered request body, so the client is
/// typed over `Full<Bytes>` rather than a streaming body.
pub type HttpClient = Client<HttpConnector, Full<Bytes>>;
pub type RespBody = BoxBody<Bytes, hyper::Error>;

pub fn build_client() -> HttpClient {
    let connector = HttpConnector::new();
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Forward a request to the origin, reusing the original method, headers,
/// and path, with the buffered body.
pub async fn forward(
    parts: http::request::Parts,
    body: Bytes,
    client: &HttpClient,
    origin: &str,
) -> Result<Response<RespBody>> {
    let uri = format!(
        "http://{}{}",
        origin,
        parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("")
    )
    .parse()
    .map_err(GatewayError::InvalidUri)?;

    let mut parts = parts;
    parts.uri = uri;
    // The buffered body may be shorter than the original (truncation at the
    // buffer cap); let the client re-frame it.
    parts.headers.remove(http::header::CONTENT_LENGTH);
    parts.headers.remove(http::header::TRANSFER_ENCODING);
    let out_req = Request::from_parts(parts, Full::new(body));
    let resp = client
        .request(out_req)
        .await
        .map_err(|e| GatewayError::Http(format!("Origin request failed: {e}")))?;
    Ok(resp.map(|b| b.boxed()))
}

pub fn full_body(bytes: Bytes) -> RespBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

pub fn empty_body() -> RespBody {
    full_body(Bytes::new())
}

pub fn bad_gateway() -> Response<RespBody> {
    let mut resp = Response::new(empty_body());
    *resp.status_mut() = http::StatusCode::BAD_GATEWAY;
    resp
}

pub fn internal_error() -> Response<RespBody> {
    let mut resp = Response::new(full_body(Bytes::from("Internal Server Error")));
    *resp.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
    resp
}
