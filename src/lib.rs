//! # Agora
//!
//! Real-time chat and notification service. Authenticated users hold one
//! WebSocket each; chat messages are validated, rate limited, persisted and
//! broadcast, and the rest of the application pushes private messages,
//! comment and publish notifications through the same connections.
//!
//! ## Modules
//!
//! - [`websocket`]: Connection hub, socket pumps and notification dispatch
//! - [`api`]: HTTP surface with Axum (upgrade, presence, health)
//! - [`services`]: Persistence and user directory seams
//! - [`models`]: Domain records
//! - [`config`]: TOML configuration with environment overrides

pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod websocket;

pub use api::{build_router, serve, ApiError, AppState, AuthenticatedUser};

pub use config::{Config, ConfigError, LoggingConfig, ServerConfig, WebSocketConfig};

pub use models::{
    ChatMessage, Comment, CommentAuthor, CommentSubject, NewChatMessage, OnlineUser,
    PrivateMessage, UserId, UserProfile,
};

pub use services::{ChatMessageStore, StoreError, UserDirectory};

pub use websocket::{
    ClientMessage, Connection, ConnectionHub, ConnectionState, HubError, Notifier, ServerMessage,
};
