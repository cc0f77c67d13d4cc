//! Development reverse proxy.
//!
//! When enabled, the gateway's own handlers are mounted under
//! `gatewayPath` and every other request whose path starts with
//! `targetPath` is forwarded to a single upstream.
//!
//! # Design Decisions
//! - The request is streamed through as-is apart from hop-by-hop headers
//! - The inbound `Host` header is kept
//! - Upstream connection failures answer 502; upstream responses (any
//!   status) are passed back untouched

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::config::ReverseProxySettings;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that describe a single connection and must not be forwarded.
static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Single-upstream HTTP forwarder.
#[derive(Debug, Clone)]
pub struct ReverseProxy {
    settings: ReverseProxySettings,
    origin: String,
    base_path: String,
    client: Client<HttpConnector, Body>,
}

impl ReverseProxy {
    /// Creates a forwarder for validated settings.
    #[must_use]
    pub fn new(settings: ReverseProxySettings) -> Self {
        let target = &settings.target;
        let host = target.host_str().unwrap_or_default();
        let origin = match target.port() {
            Some(port) => format!("{}://{host}:{port}", target.scheme()),
            None => format!("{}://{host}", target.scheme()),
        };
        let base_path = target.path().trim_end_matches('/').to_string();
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            settings,
            origin,
            base_path,
            client,
        }
    }

    /// Returns the prefix the gateway's own handlers are mounted under.
    #[must_use]
    pub fn gateway_path(&self) -> &str {
        &self.settings.gateway_path
    }

    /// Returns `true` if `path` should be forwarded upstream.
    #[must_use]
    pub fn owns(&self, path: &str) -> bool {
        path.starts_with(self.settings.target_path.as_str())
    }

    /// Builds the upstream URI for an inbound one.
    ///
    /// The target's own path is used as a base and the inbound path and
    /// query are appended to it.
    #[must_use]
    pub fn upstream_uri(&self, uri: &Uri) -> Option<Uri> {
        let path_and_query = uri
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        format!("{}{}{path_and_query}", self.origin, self.base_path)
            .parse()
            .ok()
    }

    /// Forwards `request` upstream and returns the upstream response.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let Some(uri) = self.upstream_uri(request.uri()) else {
            tracing::warn!(uri = %request.uri(), "cannot build upstream uri");
            return StatusCode::BAD_GATEWAY.into_response();
        };
        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let (mut parts, body) = request.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        if let Some(addr) = client_addr {
            append_forwarded_for(&mut parts.headers, addr);
        }
        tracing::debug!(method = %parts.method, upstream = %uri, "forwarding request");
        parts.uri = uri;

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(error = %e, upstream = %self.settings.target, "upstream request failed");
                (StatusCode::BAD_GATEWAY, "upstream request failed").into_response()
            }
        }
    }
}

/// Removes hop-by-hop headers, including any named in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");
    for name in listed.split(',') {
        if let Ok(name) = HeaderName::from_bytes(name.trim().as_bytes()) {
            headers.remove(name);
        }
    }
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let ip = addr.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::ReverseProxyOverrides;

    fn proxy(target: &str, target_path: &str) -> ReverseProxy {
        let overrides = ReverseProxyOverrides {
            target: Some(target.to_string()),
            target_path: Some(target_path.to_string()),
            gateway_path: None,
        };
        let Ok(settings) = ReverseProxySettings::merge(&overrides) else {
            panic!("settings should validate");
        };
        ReverseProxy::new(settings)
    }

    #[test]
    fn upstream_uri_joins_base_path_and_query() {
        let proxy = proxy("http://upstream:8080/base/", "/");
        let inbound: Uri = "/assets/app.js?v=2".parse().unwrap_or_default();
        let Some(uri) = proxy.upstream_uri(&inbound) else {
            panic!("uri should build");
        };
        assert_eq!(uri.to_string(), "http://upstream:8080/base/assets/app.js?v=2");
    }

    #[test]
    fn upstream_uri_without_base_path() {
        let proxy = proxy("http://localhost", "/");
        let inbound: Uri = "/index.html".parse().unwrap_or_default();
        let Some(uri) = proxy.upstream_uri(&inbound) else {
            panic!("uri should build");
        };
        assert_eq!(uri.to_string(), "http://localhost/index.html");
    }

    #[test]
    fn owns_paths_under_target_path() {
        let proxy = proxy("http://localhost:3000", "/static");
        assert!(proxy.owns("/static/app.css"));
        assert!(!proxy.owns("/api/math/add"));
        assert_eq!(proxy.gateway_path(), "/api");
    }

    #[test]
    fn hop_by_hop_headers_are_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close, x-session"));
        headers.insert("x-session", HeaderValue::from_static("abc"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        strip_hop_by_hop(&mut headers);
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("x-session").is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get(header::ACCEPT).is_some());
    }

    #[test]
    fn forwarded_for_is_appended() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.1"));
        append_forwarded_for(&mut headers, SocketAddr::from(([127, 0, 0, 1], 4000)));
        assert_eq!(
            headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()),
            Some("10.0.0.1, 127.0.0.1")
        );
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        // Port 9 (discard) on loopback is closed in test environments.
        let proxy = proxy("http://127.0.0.1:9", "/");
        let request = Request::builder()
            .uri("/anything")
            .body(Body::empty())
            .unwrap_or_default();
        let response = proxy.forward(request).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
