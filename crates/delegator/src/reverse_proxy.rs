//! Path rewriting and upstream forwarding for the proxy surface:
//! `/network/{id}/{feature}/<rest>` drops its first three path segments
//! before reaching the node, with the `api` feature re-prefixing the
//! remainder with `/api`.

use axum::body::Body;
use axum::http::{Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::DelegatorError;

pub type ProxyClient = Client<HttpConnector, Body>;

pub fn new_client() -> ProxyClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Drops the `/network/{id}/{feature}` prefix from `path`, re-adding an
/// `/api` prefix when `feature` is `"api"`. Used for path-based routing;
/// subdomain ("direct") routing forwards the path unchanged instead.
pub fn rewrite_path(path: &str, feature: &str) -> String {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let mut segments = trimmed.splitn(4, '/');
    segments.next(); // "network"
    segments.next(); // network id
    segments.next(); // feature
    let rest = segments.next().unwrap_or("");

    match (feature, rest.is_empty()) {
        ("api", true) => "/api".to_string(),
        ("api", false) => format!("/api/{rest}"),
        (_, true) => "/".to_string(),
        (_, false) => format!("/{rest}"),
    }
}

/// Forwards `req` to `host:port` at `path`, preserving the original
/// query string, method, headers, and body.
pub async fn forward(
    client: &ProxyClient,
    mut req: Request<Body>,
    host: &str,
    port: &str,
    path: &str,
) -> Result<Response<Body>, DelegatorError> {
    let query = req.uri().query().map(|q| format!("?{q}")).unwrap_or_default();
    let uri: Uri = format!("http://{host}:{port}{path}{query}")
        .parse()
        .map_err(|e| DelegatorError::Upstream(format!("bad upstream uri: {e}")))?;
    *req.uri_mut() = uri;

    let resp = client
        .request(req)
        .await
        .map_err(|e| DelegatorError::Upstream(e.to_string()))?;
    Ok(resp.map(Body::new))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_api_path_with_prefix() {
        assert_eq!(rewrite_path("/network/beta/api/v0/id", "api"), "/api/v0/id");
    }

    #[test]
    fn rewrites_swarm_path_without_prefix() {
        assert_eq!(rewrite_path("/network/beta/swarm/peers", "swarm"), "/peers");
    }

    #[test]
    fn empty_rest_for_api_becomes_bare_api_root() {
        assert_eq!(rewrite_path("/network/beta/api", "api"), "/api");
    }

    #[test]
    fn empty_rest_for_gateway_becomes_root() {
        assert_eq!(rewrite_path("/network/beta/gateway", "gateway"), "/");
    }
}
