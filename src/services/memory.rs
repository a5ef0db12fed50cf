//! In-memory collaborators

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{ChatMessageStore, StoreError, UserDirectory};
use crate::models::{ChatMessage, NewChatMessage, UserId, UserProfile};

/// Append-only chat log held in memory
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    next_id: AtomicU64,
    messages: RwLock<Vec<ChatMessage>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Most recent messages, oldest first
    pub fn recent(&self, limit: usize) -> Vec<ChatMessage> {
        let messages = self.messages.read();
        let start = messages.len().saturating_sub(limit);
        messages[start..].to_vec()
    }
}

#[async_trait]
impl ChatMessageStore for MemoryChatStore {
    async fn save_message(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError> {
        let now = Utc::now();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        let stored = ChatMessage {
            id,
            user_id: message.user_id,
            username: message.username,
            nickname: message.nickname,
            avatar: message.avatar,
            content: message.content,
            message_type: 1,
            send_time: now,
            ip_address: message.ip_address,
            status: 1,
            created_at: now,
        };

        self.messages.write().push(stored.clone());
        Ok(stored)
    }
}

/// Fixed set of user profiles
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    profiles: RwLock<HashMap<UserId, UserProfile>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a profile
    pub fn insert(&self, profile: UserProfile) {
        self.profiles.write().insert(profile.user_id, profile);
    }

    /// Builder-style insert
    pub fn with_user(self, user_id: UserId, username: &str, nickname: &str) -> Self {
        self.insert(UserProfile {
            user_id,
            username: username.to_string(),
            nickname: nickname.to_string(),
            avatar: String::new(),
        });
        self
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn profile(&self, user_id: UserId) -> Result<UserProfile, StoreError> {
        self.profiles
            .read()
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::UserNotFound(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(content: &str) -> NewChatMessage {
        NewChatMessage {
            user_id: 1,
            username: "alice".to_string(),
            nickname: "Alice".to_string(),
            avatar: String::new(),
            content: content.to_string(),
            ip_address: "127.0.0.1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_assigns_increasing_ids() {
        let store = MemoryChatStore::new();

        let first = store.save_message(draft("one")).await.unwrap();
        let second = store.save_message(draft("two")).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(second.status, 1);
        assert_eq!(second.message_type, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.recent(1)[0].content, "two");
    }

    #[tokio::test]
    async fn test_directory_lookup() {
        let directory = MemoryUserDirectory::new().with_user(5, "bob", "Bob");

        let profile = directory.profile(5).await.unwrap();
        assert_eq!(profile.username, "bob");

        let missing = directory.profile(6).await;
        assert!(matches!(missing, Err(StoreError::UserNotFound(6))));
    }
}
