//! Agora HTTP API
//!
//! HTTP and WebSocket surface of the chat service, built with Axum.
//!
//! # Endpoints
//!
//! ## Chat
//! - `GET /api/v1/chat/ws` - Authenticated WebSocket connection
//! - `GET /api/v1/chat/online-count` - Number of connected users
//! - `GET /api/v1/chat/online-users` - Connected users
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use agora::api::{serve, AppState};
//! use agora::config::Config;
//! use agora::services::{MemoryChatStore, MemoryUserDirectory};
//! use agora::websocket::{ConnectionHub, Notifier};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let hub = ConnectionHub::start(
//!         config.websocket.clone(),
//!         Arc::new(MemoryChatStore::new()),
//!         Arc::new(MemoryUserDirectory::new()),
//!     );
//!     let notifier = Notifier::with_hub(Arc::clone(&hub));
//!
//!     serve(AppState::new(config, hub, notifier)).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use auth::{AuthenticatedUser, USER_ID_HEADER};
pub use error::ApiError;
pub use state::AppState;

use axum::{http::HeaderValue, middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::websocket::chat_websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let chat_routes = Router::new()
        .route("/ws", get(chat_websocket_handler))
        .route("/online-count", get(routes::chat::online_count))
        .route("/online-users", get(routes::chat::online_users));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let cors = cors_layer(&state.config.server.cors_origins);
    let trust_user_header = state.config.server.trust_user_header;
    let shared_state = Arc::new(state);

    let mut router = Router::new()
        .nest("/api/v1/chat", chat_routes)
        .nest("/health", health_routes);

    if trust_user_header {
        tracing::warn!("Trusting {} header for identity; do not use in production", USER_ID_HEADER);
        router = router.layer(middleware::from_fn(auth::trust_user_header));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// CORS from the same allow-list the WebSocket origin check uses
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Start the API server
pub async fn serve(state: AppState) -> Result<(), ApiError> {
    let addr = state.config.server.addr();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Agora listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Agora shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::OnlineUser;
    use crate::services::{MemoryChatStore, MemoryUserDirectory};
    use crate::websocket::{Connection, ConnectionHub, Notifier};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use tower::util::ServiceExt;

    fn test_config(trust_user_header: bool) -> Config {
        let mut config = Config::default();
        config.server.cors_origins = vec!["https://chat.example".to_string()];
        config.server.trust_user_header = trust_user_header;
        config
    }

    fn create_test_app(config: Config) -> (Router, Arc<ConnectionHub>) {
        let directory = MemoryUserDirectory::new().with_user(1, "alice", "Alice");
        let hub = ConnectionHub::start(
            config.websocket.clone(),
            Arc::new(MemoryChatStore::new()),
            Arc::new(directory),
        );
        let notifier = Notifier::with_hub(Arc::clone(&hub));
        let state = AppState::new(config, Arc::clone(&hub), notifier);
        (build_router(state), hub)
    }

    async fn request(app: Router, uri: &str, headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        app.oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let (app, _hub) = create_test_app(test_config(true));
        let response = request(app, "/health/live", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let (app, _hub) = create_test_app(test_config(true));
        let response = request(app, "/health/ready", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full() {
        let (app, _hub) = create_test_app(test_config(true));
        let response = request(app, "/health", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["online_connections"], 0);
    }

    #[tokio::test]
    async fn test_online_count_empty() {
        let (app, _hub) = create_test_app(test_config(true));
        let response = request(app, "/api/v1/chat/online-count", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"count": 0}));
    }

    #[tokio::test]
    async fn test_online_users_lists_connected() {
        let (app, hub) = create_test_app(test_config(true));
        let user = OnlineUser {
            user_id: 1,
            username: "alice".to_string(),
            nickname: "Alice".to_string(),
            avatar: String::new(),
        };
        let (conn, _rx) = Connection::new(user, "127.0.0.1", 8, 3);
        hub.register(conn).await.unwrap();

        let response = request(app, "/api/v1/chat/online-users", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["users"][0]["user_id"], 1);
        assert_eq!(body["users"][0]["username"], "alice");
    }

    #[tokio::test]
    async fn test_ws_requires_identity() {
        let (app, _hub) = create_test_app(test_config(true));
        let response = request(app, "/api/v1/chat/ws", &[]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_ws_ignores_user_header_unless_trusted() {
        let (app, _hub) = create_test_app(test_config(false));
        let response = request(app, "/api/v1/chat/ws", &[(USER_ID_HEADER, "1")]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_ws_rejects_foreign_origin() {
        let (app, _hub) = create_test_app(test_config(true));
        let response = request(
            app,
            "/api/v1/chat/ws",
            &[(USER_ID_HEADER, "1"), ("origin", "https://evil.example")],
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_ws_unknown_profile_is_internal_error() {
        let (app, _hub) = create_test_app(test_config(true));
        let response = request(app, "/api/v1/chat/ws", &[(USER_ID_HEADER, "99")]).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_ws_plain_request_is_not_upgraded() {
        let (app, hub) = create_test_app(test_config(true));
        let response = request(
            app,
            "/api/v1/chat/ws",
            &[(USER_ID_HEADER, "1"), ("origin", "https://chat.example")],
        )
        .await;
        assert!(response.status().is_client_error());
        assert_eq!(hub.online_count(), 0);
    }

    fn create_stopped_app() -> Router {
        let config = test_config(true);
        let hub = ConnectionHub::stopped(
            config.websocket.clone(),
            Arc::new(MemoryChatStore::new()),
            Arc::new(MemoryUserDirectory::new().with_user(1, "alice", "Alice")),
        );
        let notifier = Notifier::with_hub(Arc::clone(&hub));
        build_router(AppState::new(config, hub, notifier))
    }

    #[tokio::test]
    async fn test_ws_refused_when_hub_stopped() {
        let app = create_stopped_app();
        let response = request(app, "/api/v1/chat/ws", &[(USER_ID_HEADER, "1")]).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_not_ready_when_hub_stopped() {
        let app = create_stopped_app();
        let response = request(app, "/health/ready", &[]).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
