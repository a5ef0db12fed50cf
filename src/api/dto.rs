//! Data Transfer Objects
//!
//! Response types for the HTTP endpoints.

use serde::{Deserialize, Serialize};

use crate::models::OnlineUser;

/// GET /api/v1/chat/online-count
#[derive(Debug, Serialize, Deserialize)]
pub struct OnlineCountResponse {
    pub count: usize,
}

/// GET /api/v1/chat/online-users
#[derive(Debug, Serialize, Deserialize)]
pub struct OnlineUsersResponse {
    pub users: Vec<OnlineUser>,
    pub count: usize,
}

/// Full health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,
    pub online_connections: usize,
    pub uptime_seconds: u64,
    pub version: String,
}
