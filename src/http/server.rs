//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the proxy, health, and key lifecycle handlers
//! - Wire up middleware (request ID, tracing, timeout, concurrency limit)
//! - Serve on a bound listener until the shutdown signal fires

use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::{self, handlers::get_status};
use crate::config::ProxyConfig;
use crate::http::request::{read_body, ProxyQuery};
use crate::keys::KeyStore;
use crate::observability::metrics;
use crate::proxy::{HttpUpstream, ProxyError, ProxyResponse, ProxyService, Upstream};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: ProxyService,
    pub keys: Arc<dyn KeyStore>,
    pub admin_token: Arc<str>,
    pub max_body_bytes: usize,
}

/// HTTP server for the key-gated proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a server that dispatches through a real HTTP client.
    pub fn new(config: ProxyConfig, keys: Arc<dyn KeyStore>) -> Result<Self, reqwest::Error> {
        let upstream = Arc::new(HttpUpstream::from_config(&config.upstream)?);
        Ok(Self::with_upstream(config, keys, upstream))
    }

    /// Create a server around an explicit upstream.
    pub fn with_upstream(
        config: ProxyConfig,
        keys: Arc<dyn KeyStore>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        let state = AppState {
            proxy: ProxyService::from_config(&config, keys.clone(), upstream),
            keys,
            admin_token: Arc::from(config.admin.api_key.as_str()),
            max_body_bytes: config.security.max_body_bytes,
        };

        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/proxy", any(proxy_handler))
            .route("/health", get(get_status));

        if config.admin.enabled {
            router = router.merge(admin::setup_admin_router(state.clone()));
        }

        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                // The query carries the caller's key, so only the path is recorded.
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.inbound_secs)))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections));

        router.with_state(state).layer(middleware)
    }

    /// Clone of the fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            admin_enabled = self.config.admin.enabled,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Proxy endpoint: validate, dispatch, relay.
async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    match serve_proxy(&state, request).await {
        Ok(response) => {
            tracing::info!(
                method = %method,
                status = response.status.as_u16(),
                bytes = response.body.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Request relayed"
            );
            metrics::record_request(&method, "relayed", start);
            response.into_response()
        }
        Err(e) => {
            tracing::info!(
                method = %method,
                status = e.status_code().as_u16(),
                error = %e,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Request failed"
            );
            metrics::record_request(&method, e.outcome(), start);
            e.into_response()
        }
    }
}

/// The body stays unread until the key is accepted.
async fn serve_proxy(state: &AppState, request: Request) -> Result<ProxyResponse, ProxyError> {
    let (parts, body) = request.into_parts();
    let query = ProxyQuery::from_uri(&parts.uri);

    let authorized = state
        .proxy
        .authorize(query.presented_key, query.target_url)
        .await?;
    let body = read_body(&parts.headers, body, state.max_body_bytes).await?;

    state
        .proxy
        .forward(authorized, parts.method, parts.headers, body)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::ErrorBody;
    use crate::keys::{FileKeyStore, KeyStore, Lifetime};
    use crate::proxy::{DispatchError, OutboundRequest, UpstreamResponse};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    struct NoUpstream;

    #[async_trait]
    impl Upstream for NoUpstream {
        async fn dispatch(&self, _: OutboundRequest) -> Result<UpstreamResponse, DispatchError> {
            Err(DispatchError::Unreachable("no upstream in tests".into()))
        }
    }

    fn server(config: ProxyConfig) -> HttpServer {
        HttpServer::with_upstream(config, Arc::new(FileKeyStore::in_memory()), Arc::new(NoUpstream))
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_operational() {
        let response = server(ProxyConfig::default()).router().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "operational");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn missing_parameters_are_json_bad_request() {
        let response = server(ProxyConfig::default())
            .router()
            .oneshot(get("/proxy?url=http%3A%2F%2Fexample.com%2F"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "apiKey and url query parameters are required");
    }

    fn oversize_post(uri: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(vec![b'x'; 64]))
            .unwrap()
    }

    async fn status_and_error(response: Response) -> (StatusCode, String) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body.error)
    }

    #[tokio::test]
    async fn key_is_checked_before_the_body_is_read() {
        let mut config = ProxyConfig::default();
        config.security.max_body_bytes = 16;
        let store = Arc::new(FileKeyStore::in_memory());
        let record = store.create("US-East", Lifetime::Unlimited).await.unwrap();
        let router = HttpServer::with_upstream(config, store, Arc::new(NoUpstream)).router();

        let (status, error) = status_and_error(
            router
                .clone()
                .oneshot(oversize_post("/proxy?url=http%3A%2F%2Fexample.com%2F"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error, "apiKey and url query parameters are required");

        let (status, error) = status_and_error(
            router
                .clone()
                .oneshot(oversize_post("/proxy?apiKey=proxy_live_bogus&url=http%3A%2F%2Fexample.com%2F"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error, "Invalid or incorrect API Key");

        let uri = format!("/proxy?apiKey={}&url=http%3A%2F%2Fexample.com%2F", record.key);
        let (status, error) = status_and_error(router.oneshot(oversize_post(&uri)).await.unwrap()).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(error, "Payload exceeds the 16 byte limit");
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let response = server(ProxyConfig::default()).router().oneshot(get("/health")).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));

        let request = Request::builder()
            .uri("/health")
            .header("x-request-id", "caller-chosen")
            .body(Body::empty())
            .unwrap();
        let response = server(ProxyConfig::default()).router().oneshot(request).await.unwrap();
        assert_eq!(response.headers().get("x-request-id").unwrap(), "caller-chosen");
    }

    #[tokio::test]
    async fn key_routes_absent_when_admin_disabled() {
        let response = server(ProxyConfig::default()).router().oneshot(get("/keys")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn key_routes_mounted_when_admin_enabled() {
        let mut config = ProxyConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "operator-token".into();

        let request = Request::builder()
            .uri("/keys")
            .header("authorization", "Bearer operator-token")
            .body(Body::empty())
            .unwrap();
        let response = server(config).router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
