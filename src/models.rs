//! Domain Models
//!
//! Records exchanged with the persistence and identity collaborators, and the
//! application events that the notification helpers turn into push payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric user identifier assigned by the account store
pub type UserId = u64;

/// A chat message as stored by the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub user_id: UserId,
    pub username: String,
    pub nickname: String,
    pub avatar: String,
    pub content: String,
    /// 1 = regular message, 2 = system message
    pub message_type: i32,
    pub send_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_address: String,
    /// 0 = deleted, 1 = visible
    pub status: i32,
    pub created_at: DateTime<Utc>,
}

/// A chat message accepted from a connection, before it has been stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewChatMessage {
    pub user_id: UserId,
    pub username: String,
    pub nickname: String,
    pub avatar: String,
    pub content: String,
    pub ip_address: String,
}

/// Display profile resolved at connect time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: String,
    pub nickname: String,
    pub avatar: String,
}

/// Snapshot entry of a currently connected user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    pub user_id: UserId,
    pub username: String,
    pub nickname: String,
    pub avatar: String,
}

impl From<UserProfile> for OnlineUser {
    fn from(profile: UserProfile) -> Self {
        Self {
            user_id: profile.user_id,
            username: profile.username,
            nickname: profile.nickname,
            avatar: profile.avatar,
        }
    }
}

/// Public identity of a comment author or reply target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: UserId,
    pub username: String,
    pub nickname: String,
    pub avatar: String,
}

/// What a comment is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentSubject {
    Article(u64),
    Resource(u64),
}

/// A freshly created comment or reply
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: u64,
    pub subject: CommentSubject,
    pub user_id: UserId,
    /// 0 for a top-level comment
    pub parent_id: u64,
    pub root_id: u64,
    pub reply_to_user_id: Option<UserId>,
    pub content: String,
    pub like_count: i64,
    pub reply_count: i64,
    pub status: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    /// A comment with a parent is a reply
    pub fn is_reply(&self) -> bool {
        self.parent_id > 0
    }
}

/// Participant of a private conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationUser {
    pub id: UserId,
    pub username: String,
    pub nickname: String,
    pub avatar: String,
}

/// A delivered private message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub id: u64,
    pub conversation_id: u64,
    pub sender: ConversationUser,
    pub receiver: ConversationUser,
    pub content: String,
    pub is_read: bool,
    pub is_self: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_omits_empty_ip() {
        let now = Utc::now();
        let msg = ChatMessage {
            id: 1,
            user_id: 7,
            username: "alice".to_string(),
            nickname: "Alice".to_string(),
            avatar: String::new(),
            content: "hi".to_string(),
            message_type: 1,
            send_time: now,
            ip_address: String::new(),
            status: 1,
            created_at: now,
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("ip_address").is_none());
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn test_comment_is_reply() {
        let now = Utc::now();
        let mut comment = Comment {
            id: 3,
            subject: CommentSubject::Article(9),
            user_id: 1,
            parent_id: 0,
            root_id: 0,
            reply_to_user_id: None,
            content: "first".to_string(),
            like_count: 0,
            reply_count: 0,
            status: 1,
            created_at: now,
            updated_at: now,
        };
        assert!(!comment.is_reply());

        comment.parent_id = 2;
        assert!(comment.is_reply());
    }
}
