//! Chat presence routes
//!
//! - GET /api/v1/chat/online-count
//! - GET /api/v1/chat/online-users

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::{OnlineCountResponse, OnlineUsersResponse};
use crate::api::state::AppState;

pub async fn online_count(State(state): State<Arc<AppState>>) -> Json<OnlineCountResponse> {
    Json(OnlineCountResponse {
        count: state.hub.online_count(),
    })
}

pub async fn online_users(State(state): State<Arc<AppState>>) -> Json<OnlineUsersResponse> {
    let users = state.hub.online_users();
    Json(OnlineUsersResponse {
        count: users.len(),
        users,
    })
}
