//! HTTP surface — the reverse-proxy front door: a small set of fixed
//! routes plus a generic `/network/{id}/{feature}/*` proxy route, with an
//! optional subdomain-addressed fallback.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use serde_json::json;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::error::DelegatorError;
use crate::proxy_cache::{cache_key, ProxyTarget};
use crate::reverse_proxy;
use crate::state::DelegatorState;

const FEATURES: [&str; 3] = ["api", "swarm", "gateway"];

pub fn build_router(state: DelegatorState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::HEAD, Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_credentials(true);

    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/status", get(status_handler))
        .route("/network/{id}/status", get(network_status_handler))
        .route("/network/{id}/{feature}", any(feature_handler))
        .route("/network/{id}/{feature}/{*rest}", any(feature_handler))
        .fallback(subdomain_fallback)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
                .layer(cors),
        )
        .with_state(state)
}

async fn status_handler() -> impl IntoResponse {
    Json(json!({ "status": "online", "version": env!("CARGO_PKG_VERSION") }))
}

async fn network_status_handler(State(state): State<DelegatorState>, Path(id): Path<String>) -> impl IntoResponse {
    if state.registry.get(&id).is_ok() {
        (StatusCode::OK, Json(json!({ "status": "registered" })))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "status": "not_registered" })))
    }
}

async fn feature_handler(
    State(state): State<DelegatorState>,
    Path(params): Path<HashMap<String, String>>,
    req: Request<Body>,
) -> Response {
    let network_id = params.get("id").cloned().unwrap_or_default();
    let feature = params.get("feature").cloned().unwrap_or_default();
    match proxy_request(&state, &network_id, &feature, None, req).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

/// Unmatched requests fall through here so a configured external hostname
/// can be recognized by its `Host` header: `{id}.{feature}.{address}`
/// forwards the path unchanged ("direct" mode).
async fn subdomain_fallback(State(state): State<DelegatorState>, req: Request<Body>) -> Response {
    if state.config.address.is_empty() {
        return DelegatorError::NetworkNotFound("no matching route".into()).into_response();
    }

    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("")
        .to_string();

    let suffix = format!(".{}", state.config.address);
    let Some(prefix) = host.strip_suffix(&suffix) else {
        return DelegatorError::NetworkNotFound("unrecognized host".into()).into_response();
    };

    let mut parts = prefix.splitn(2, '.');
    let network_id = parts.next().unwrap_or("").to_string();
    let Some(feature) = parts.next() else {
        return DelegatorError::InvalidFeature("missing feature subdomain".into()).into_response();
    };
    let feature = feature.to_string();
    let path = req.uri().path().to_string();

    match proxy_request(&state, &network_id, &feature, Some(&path), req).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

/// Resolves `network_id`/`feature` against the registry and network
/// descriptor, enforces the per-feature access rule, and forwards the
/// request. `direct_path`, when set, is used verbatim instead of
/// rewriting the request's own path (subdomain "direct" mode).
async fn proxy_request(
    state: &DelegatorState,
    network_id: &str,
    feature: &str,
    direct_path: Option<&str>,
    req: Request<Body>,
) -> Result<Response, DelegatorError> {
    if !FEATURES.contains(&feature) {
        return Err(DelegatorError::InvalidFeature(feature.to_string()));
    }

    let node = state
        .registry
        .get(network_id)
        .map_err(|_| DelegatorError::NetworkNotFound(network_id.to_string()))?;

    let mut cors_origin: Option<String> = None;

    match feature {
        "swarm" => {}
        "api" => {
            let header = req.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
            let claims = auth::verify_bearer(header, &state.config.jwt_key, state.now_fn)?;

            let descriptor = state
                .store
                .get(network_id)
                .await
                .map_err(|_| DelegatorError::NetworkNotFound(network_id.to_string()))?;

            if !descriptor.authorized_users.iter().any(|u| u == &claims.id) {
                return Err(DelegatorError::Forbidden);
            }
            cors_origin = Some(descriptor.allowed_origin_header().to_string());

            if req.method() == Method::OPTIONS {
                let mut resp = Response::new(Body::empty());
                *resp.status_mut() = StatusCode::OK;
                set_cors_headers(&mut resp, cors_origin.as_deref().unwrap_or("*"));
                return Ok(resp);
            }
        }
        "gateway" => {
            let descriptor = state
                .store
                .get(network_id)
                .await
                .map_err(|_| DelegatorError::NetworkNotFound(network_id.to_string()))?;
            if !descriptor.gateway_public {
                return Err(DelegatorError::FeatureUnavailable);
            }
        }
        _ => unreachable!("feature already validated"),
    }

    let key = cache_key(network_id, feature);
    let port = match state.proxy_cache.get(&key) {
        Some(target) => target.port,
        None => {
            let port = match feature {
                "api" => node.ports.api.clone(),
                "swarm" => node.ports.swarm.clone(),
                "gateway" => node.ports.gateway.clone(),
                _ => unreachable!("feature already validated"),
            };
            if port.is_empty() {
                return Err(DelegatorError::ContextMissing(format!(
                    "{feature} port not yet assigned for network {network_id}"
                )));
            }
            state.proxy_cache.insert(key, ProxyTarget { host: "127.0.0.1".to_string(), port: port.clone() });
            port
        }
    };

    let path = direct_path
        .map(str::to_string)
        .unwrap_or_else(|| reverse_proxy::rewrite_path(req.uri().path(), feature));

    let mut resp = reverse_proxy::forward(&state.client, req, "127.0.0.1", &port, &path).await?;
    if let Some(origin) = cors_origin {
        set_cors_headers(&mut resp, &origin);
    }
    Ok(resp)
}

fn set_cors_headers(resp: &mut Response, origin: &str) {
    if let Ok(value) = origin.parse() {
        resp.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    resp.headers_mut().insert(header::VARY, header::HeaderValue::from_static("Origin"));
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::http::Request;
    use http_body_util::BodyExt;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use orchestrator::store::NetworkStore;
    use tower::ServiceExt;

    use orchestrator::port_pool::PortPool;
    use orchestrator::store::InMemoryNetworkStore;
    use orchestrator::types::{NetworkDescriptor, NodeInfo};
    use orchestrator::NodeRegistry;

    use crate::auth::{system_now, Claims};

    const JWT_KEY: &str = "test-secret";

    fn token_for(id: &str, exp_from_now: i64) -> String {
        let claims = Claims { id: id.to_string(), exp: system_now() + exp_from_now };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(JWT_KEY.as_bytes())).unwrap()
    }

    fn test_registry() -> Arc<NodeRegistry> {
        Arc::new(NodeRegistry::new(
            PortPool::new("127.0.0.1", &["0".to_string()]),
            PortPool::new("127.0.0.1", &["0".to_string()]),
            PortPool::new("127.0.0.1", &["0".to_string()]),
        ))
    }

    fn test_state(registry: Arc<NodeRegistry>, store: Arc<InMemoryNetworkStore>) -> DelegatorState {
        let mut config = crate::config::DelegatorConfig::default();
        config.jwt_key = JWT_KEY.to_string();
        DelegatorState::new(config, registry, store)
    }

    /// Spawns a trivial upstream HTTP server that echoes the request path it
    /// received back as the response body, and returns its port.
    async fn spawn_echo_upstream() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port().to_string();
        let app = Router::new().fallback(|req: Request<Body>| async move {
            axum::response::Response::new(Body::from(req.uri().path().to_string()))
        });
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        port
    }

    async fn body_string(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn features_list_matches_spec() {
        assert_eq!(FEATURES, ["api", "swarm", "gateway"]);
    }

    #[tokio::test]
    async fn status_endpoint_reports_online() {
        let state = test_state(test_registry(), Arc::new(InMemoryNetworkStore::new()));
        let app = build_router(state);

        let resp = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn network_status_reports_not_registered_for_unknown_network() {
        let state = test_state(test_registry(), Arc::new(InMemoryNetworkStore::new()));
        let app = build_router(state);

        let resp = app
            .oneshot(Request::builder().uri("/network/ghost/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn api_proxy_rejects_missing_token() {
        let registry = test_registry();
        registry.register(NodeInfo::new("alpha", "job-1")).unwrap();
        let state = test_state(registry, Arc::new(InMemoryNetworkStore::new()));
        let app = build_router(state);

        let resp = app
            .oneshot(Request::builder().uri("/network/alpha/api/v0/id").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn api_proxy_rejects_unauthorized_user() {
        let registry = test_registry();
        registry.register(NodeInfo::new("alpha", "job-1")).unwrap();
        let store = Arc::new(InMemoryNetworkStore::new());
        let mut descriptor = NetworkDescriptor::new("alpha");
        descriptor.authorized_users = vec!["u2".to_string()];
        store.seed(descriptor);

        let state = test_state(registry, store);
        let app = build_router(state);

        let token = token_for("u1", 3600);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/network/alpha/api/v0/id")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn api_proxy_forwards_authorized_request_with_rewritten_path() {
        let registry = test_registry();
        let node = registry.register(NodeInfo::new("alpha", "job-1")).unwrap();
        let upstream_port = spawn_echo_upstream().await;
        registry
            .replace(NodeInfo {
                ports: orchestrator::types::Ports { api: upstream_port, ..node.ports },
                ..node
            })
            .unwrap();

        let store = Arc::new(InMemoryNetworkStore::new());
        let mut descriptor = NetworkDescriptor::new("alpha");
        descriptor.authorized_users = vec!["u1".to_string()];
        store.seed(descriptor);

        let state = test_state(registry, store);
        let app = build_router(state);

        let token = token_for("u1", 3600);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/network/alpha/api/v0/id")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "/api/v0/id");
    }

    #[tokio::test]
    async fn api_options_preflight_short_circuits_before_upstream() {
        let registry = test_registry();
        registry.register(NodeInfo::new("alpha", "job-1")).unwrap();
        let store = Arc::new(InMemoryNetworkStore::new());
        let mut descriptor = NetworkDescriptor::new("alpha");
        descriptor.authorized_users = vec!["u1".to_string()];
        descriptor.api_allowed_origin = "https://example.com".to_string();
        store.seed(descriptor);

        let state = test_state(registry, store);
        let app = build_router(state);

        let token = token_for("u1", 3600);
        let resp = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/network/alpha/api/v0/id")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://example.com"
        );
    }

    #[tokio::test]
    async fn gateway_proxy_hidden_until_made_public() {
        let registry = test_registry();
        let node = registry.register(NodeInfo::new("alpha", "job-1")).unwrap();
        let upstream_port = spawn_echo_upstream().await;
        registry
            .replace(NodeInfo {
                ports: orchestrator::types::Ports { gateway: upstream_port, ..node.ports },
                ..node
            })
            .unwrap();

        let store = Arc::new(InMemoryNetworkStore::new());
        store.seed(NetworkDescriptor::new("alpha"));
        let state = test_state(registry.clone(), store.clone());
        let app = build_router(state);

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/network/alpha/gateway/ipfs/Qm1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let mut descriptor = store.get("alpha").await.unwrap();
        descriptor.gateway_public = true;
        store.save(&descriptor).await.unwrap();

        let resp = app
            .oneshot(Request::builder().uri("/network/alpha/gateway/ipfs/Qm1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "/ipfs/Qm1");
    }

    #[tokio::test]
    async fn swarm_proxy_with_unassigned_port_reports_unprocessable() {
        let registry = test_registry();
        let node = registry.register(NodeInfo::new("alpha", "job-1")).unwrap();
        registry
            .replace(NodeInfo { ports: orchestrator::types::Ports { swarm: String::new(), ..node.ports }, ..node })
            .unwrap();
        let state = test_state(registry, Arc::new(InMemoryNetworkStore::new()));
        let app = build_router(state);

        let resp = app
            .oneshot(Request::builder().uri("/network/alpha/swarm/peers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn invalid_feature_is_rejected() {
        let registry = test_registry();
        registry.register(NodeInfo::new("alpha", "job-1")).unwrap();
        let state = test_state(registry, Arc::new(InMemoryNetworkStore::new()));
        let app = build_router(state);

        let resp = app
            .oneshot(Request::builder().uri("/network/alpha/bogus/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
