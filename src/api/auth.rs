//! Request identity
//!
//! Authentication happens upstream: whatever validates the caller inserts an
//! [`AuthenticatedUser`] into the request extensions. For local development the
//! server can instead trust an `X-User-Id` header.

use axum::{extract::Request, middleware::Next, response::Response};

use crate::models::UserId;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity attached to a request by the auth layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Development-only layer: takes the caller's word for who they are
pub async fn trust_user_header(mut request: Request, next: Next) -> Response {
    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<UserId>().ok());

    if let Some(user_id) = user_id {
        request
            .extensions_mut()
            .insert(AuthenticatedUser { user_id });
    }

    next.run(request).await
}
