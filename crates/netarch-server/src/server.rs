use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{self, HandlerState};
use crate::rpc::{RpcRequest, RpcResponse};
use crate::sessions;

/// Header carrying the opaque session token.
pub const SESSION_HEADER: &str = "x-session-token";

/// Server configuration.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub session_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8501,
            request_timeout: Duration::from_secs(300),
            session_idle_timeout: Duration::from_secs(4 * 3600),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/rpc", post(rpc_handler))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `shutdown` fires.
pub async fn start(
    config: ServerConfig,
    handler_state: Arc<HandlerState>,
    shutdown: CancellationToken,
) -> Result<ServerHandle, std::io::Error> {
    let cleanup = sessions::start_cleanup_task(
        Arc::clone(&handler_state.sessions),
        Duration::from_secs(60),
        config.session_idle_timeout,
    );

    let router = build_router(AppState { handler_state }, config.request_timeout);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;

    tracing::info!(%addr, "NetArchitect server started");

    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle { addr, server, cleanup })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub addr: SocketAddr,
    server: tokio::task::JoinHandle<()>,
    cleanup: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for the server to finish after shutdown was requested.
    pub async fn join(self) {
        self.cleanup.abort();
        let _ = self.server.await;
    }
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = handlers::dispatch(
        &state.handler_state,
        "health",
        &serde_json::json!({}),
        None,
        None,
    )
    .await;

    let status = resp
        .result
        .as_ref()
        .and_then(|r| r.get("status"))
        .and_then(|s| s.as_str())
        .unwrap_or("unknown");

    let http_status = if status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (http_status, Json(resp.result.unwrap_or_default()))
}

/// Single RPC endpoint. Errors travel in the body, so the HTTP status is
/// always 200 once a request parses.
async fn rpc_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(_) => return Json(RpcResponse::parse_error()),
    };

    let token = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok());
    let params = request.params.unwrap_or(serde_json::json!({}));
    Json(handlers::dispatch(&state.handler_state, &request.method, &params, request.id, token).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use netarch_engine::Tutor;
    use netarch_llm::{CompletionClient, MockProvider, MockResponse};
    use netarch_store::Database;
    use tower::ServiceExt;

    fn handler_state(responses: Vec<MockResponse>) -> Arc<HandlerState> {
        let db = Database::in_memory().unwrap();
        let client = CompletionClient::new(Arc::new(MockProvider::new(responses)));
        let tutor = Arc::new(Tutor::new(db.clone(), client));
        Arc::new(HandlerState::new(db, tutor))
    }

    fn router() -> Router {
        build_router(
            AppState { handler_state: handler_state(vec![]) },
            Duration::from_secs(5),
        )
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn rpc(body: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/rpc").header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header(SESSION_HEADER, token);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn health_route() {
        let resp = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "healthy");
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let resp = router().oneshot(rpc("{not json", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["error"]["code"], "PARSE_ERROR");
    }

    #[tokio::test]
    async fn session_token_travels_in_header() {
        let app = router();
        let resp = app
            .clone()
            .oneshot(rpc(r#"{"method":"session.open","id":1}"#, None))
            .await
            .unwrap();
        let token = body_json(resp).await["result"]["token"].as_str().unwrap().to_string();

        let resp = app
            .oneshot(rpc(r#"{"method":"view.get","id":2}"#, Some(&token)))
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["id"], 2);
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["view"]["currentModule"], "diagnosis");
    }

    #[tokio::test]
    async fn serves_over_tcp_and_shuts_down() {
        let shutdown = CancellationToken::new();
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        let handle = start(config, handler_state(vec![]), shutdown.clone()).await.unwrap();
        assert!(handle.port() > 0);

        let url = format!("http://{}/health", handle.addr);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let resp = reqwest::Client::new()
            .post(format!("http://{}/rpc", handle.addr))
            .body(r#"{"method":"diagnosis.topics","id":"t"}"#)
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["id"], "t");
        assert_eq!(body["result"]["topics"][0], "OSPF neighbor");

        shutdown.cancel();
        handle.join().await;
    }
}
