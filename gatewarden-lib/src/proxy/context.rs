use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use serde_json::Value;

/// Per-connection edge metadata in the `cf` shape: `clientIp`, `asn`,
/// `botScore`, `tlsVersion`, `ja3`, `ja4`, `country` and arbitrary nesting.
/// Rules reference it through `cf.<dotted-path>` fields.
#[derive(Debug, Clone, Default)]
pub struct EdgeMetadata(pub Value);

impl EdgeMetadata {
    /// Minimal metadata when the host provides nothing richer: the peer
    /// socket address seeds `clientIp`.
    pub fn from_peer(peer: SocketAddr) -> Self {
        Self(serde_json::json!({ "clientIp": peer.ip().to_string() }))
    }

    /// Resolve a dotted path like `botManagement.score` into the metadata.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        json_path(&self.0, path)
    }
}

/// Walk a dotted path into a JSON value. Array indices are accepted as
/// numeric segments.
pub fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Everything the matching, fingerprinting, and dispatch stages need from a
/// request. The body is buffered once (up to the configured cap) and shared
/// with every downstream stage, including the forwarded origin request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub peer: SocketAddr,
    pub body: Bytes,
    pub edge: EdgeMetadata,
}

impl RequestContext {
    /// Client IP resolution order: `True-Client-IP`, `CF-Connecting-IP`,
    /// first token of `X-Forwarded-For`, edge metadata `clientIp`, else
    /// `"unknown"`.
    pub fn client_ip(&self) -> String {
        for name in ["true-client-ip", "cf-connecting-ip"] {
            if let Some(v) = self.header(name) {
                if !v.is_empty() {
                    return v;
                }
            }
        }
        if let Some(xff) = self.header("x-forwarded-for") {
            if let Some(first) = xff.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
        if let Some(Value::String(ip)) = self.edge.lookup("clientIp") {
            if !ip.is_empty() {
                return ip.clone();
            }
        }
        "unknown".to_string()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    /// Value of a cookie from the `Cookie` header, if present.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let raw = self.header("cookie")?;
        for pair in raw.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next()?.trim();
            if key == name {
                return Some(parts.next().unwrap_or("").trim().to_string());
            }
        }
        None
    }

    /// The buffered body as UTF-8 text (lossy).
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The buffered body parsed as JSON, if it is JSON.
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Named URL component, mirroring the URL API property names
    /// (`hostname`, `pathname`, `search`, ...). Unknown properties yield
    /// `None`.
    pub fn url_part(&self, prop: &str) -> Option<String> {
        let host = self
            .uri
            .authority()
            .map(|a| a.to_string())
            .or_else(|| self.header("host"))
            .unwrap_or_default();
        let hostname = host.rsplit_once(':').map_or(host.as_str(), |(h, _)| h);
        let search = self
            .uri
            .query()
            .map(|q| format!("?{q}"))
            .unwrap_or_default();
        match prop {
            "hostname" => Some(hostname.to_string()),
            "host" => Some(host.clone()),
            "port" => Some(host.rsplit_once(':').map(|(_, p)| p.to_string()).unwrap_or_default()),
            "pathname" => Some(self.uri.path().to_string()),
            "search" => Some(search),
            "protocol" => Some("http:".to_string()),
            "origin" => Some(format!("http://{host}")),
            "href" => Some(format!("http://{host}{}{search}", self.uri.path())),
            "hash" => Some(String::new()),
            _ => None,
        }
    }

    /// The full request URL as seen by clients.
    pub fn url(&self) -> String {
        self.url_part("href").unwrap_or_else(|| self.uri.to_string())
    }
}
