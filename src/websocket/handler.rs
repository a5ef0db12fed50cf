//! WebSocket Handler
//!
//! Admits an authenticated user onto the chat socket and hands the upgraded
//! connection to the hub and its pumps.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        ConnectInfo, Extension, State,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;

use super::connection::Connection;
use super::hub::ConnectionHub;
use super::pumps::run_session;
use crate::api::{ApiError, AppState, AuthenticatedUser};
use crate::models::{OnlineUser, UserProfile};

/// GET /api/v1/chat/ws
///
/// Checks the hub, identity, origin and profile before upgrading. Once upgraded the
/// connection is registered and its pumps run until the socket closes.
pub async fn chat_websocket_handler(
    State(state): State<Arc<AppState>>,
    identity: Option<Extension<AuthenticatedUser>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    if !state.hub.is_running() {
        tracing::error!("Connection hub stopped, refusing chat connection");
        return Err(ApiError::ServiceUnavailable(
            "Chat service unavailable".to_string(),
        ));
    }

    let Some(Extension(identity)) = identity else {
        return Err(ApiError::Unauthorized("Authentication required".to_string()));
    };
    let user_id = identity.user_id;

    if !origin_allowed(&headers, &state.config.server.cors_origins) {
        tracing::warn!(
            user_id,
            origin = ?headers.get(header::ORIGIN),
            "WebSocket origin rejected"
        );
        return Err(ApiError::Forbidden("Origin not allowed".to_string()));
    }

    let hub = Arc::clone(&state.hub);
    let profile = hub.directory().profile(user_id).await.map_err(|e| {
        tracing::error!(user_id, error = %e, "Failed to load user profile");
        ApiError::Internal(format!("Failed to load user profile: {}", e))
    })?;

    let ip_address = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(user_id, error = %rejection, "Not a WebSocket upgrade");
            return Ok(rejection.into_response());
        }
    };

    let config = hub.config().clone();
    let response = ws
        .write_buffer_size(config.write_buffer_size)
        .max_message_size(config.transport_message_limit())
        .max_frame_size(config.transport_message_limit())
        .on_failed_upgrade(move |e| {
            tracing::warn!(user_id, error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| handle_socket(socket, hub, profile, ip_address));

    Ok(response)
}

/// Register the upgraded socket and run it to completion
async fn handle_socket(
    socket: WebSocket,
    hub: Arc<ConnectionHub>,
    profile: UserProfile,
    ip_address: String,
) {
    let (conn, outbound) = Connection::new(
        OnlineUser::from(profile),
        ip_address,
        hub.config().client_send_buffer_size,
        hub.config().max_messages_per_second,
    );

    if let Err(e) = hub.register(Arc::clone(&conn)).await {
        tracing::error!(user_id = conn.user_id(), error = %e, "Failed to register WebSocket connection");
        return;
    }

    let (sink, stream) = socket.split();
    run_session(hub, conn, outbound, sink, stream).await;
}

/// No Origin header means a same-origin or non-browser client
pub fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return true;
    };
    if allowed.iter().any(|o| o == "*") {
        return true;
    }
    match origin.to_str() {
        Ok(origin) => allowed.iter().any(|o| o == origin),
        Err(_) => false,
    }
}

/// First X-Forwarded-For hop, then X-Real-IP, then the socket peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn allow(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_origin_allowed() {
        assert!(origin_allowed(&HeaderMap::new(), &allow(&["https://chat.example"])));
    }

    #[test]
    fn test_origin_exact_match() {
        let allowed = allow(&["https://chat.example"]);
        assert!(origin_allowed(&headers(&[("origin", "https://chat.example")]), &allowed));
        assert!(!origin_allowed(&headers(&[("origin", "https://evil.example")]), &allowed));
        assert!(!origin_allowed(&headers(&[("origin", "https://chat.example:8443")]), &allowed));
    }

    #[test]
    fn test_wildcard_origin() {
        assert!(origin_allowed(
            &headers(&[("origin", "https://anything.example")]),
            &allow(&["*"])
        ));
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(client_ip(&map, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_fallbacks() {
        let peer: SocketAddr = "192.0.2.10:5000".parse().unwrap();

        let map = headers(&[("x-real-ip", " 198.51.100.2 ")]);
        assert_eq!(client_ip(&map, Some(peer)), "198.51.100.2");

        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)), "192.0.2.10");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }
}
