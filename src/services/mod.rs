//! Collaborator Seams
//!
//! The hub consumes two external collaborators:
//! - [`ChatMessageStore`]: appends accepted chat messages and returns the
//!   canonical stored record
//! - [`UserDirectory`]: resolves display name and avatar at connect time
//!
//! Production deployments back these with the relational store. The
//! in-memory implementations in [`memory`] serve local runs and tests.

mod memory;

pub use memory::{MemoryChatStore, MemoryUserDirectory};

use async_trait::async_trait;

use crate::models::{ChatMessage, NewChatMessage, UserId, UserProfile};

/// Persistence hook for chat messages
#[async_trait]
pub trait ChatMessageStore: Send + Sync {
    /// Store a message and return the record as it will be broadcast
    async fn save_message(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError>;
}

/// Identity lookup for connecting users
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve a user's display profile
    async fn profile(&self, user_id: UserId) -> Result<UserProfile, StoreError>;
}

/// Errors reported by collaborators
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Backend error: {0}")]
    Backend(String),
}
