//! WebSocket Message Types
//!
//! Every frame on the wire is an envelope `{"type": <tag>, "data": <payload>}`.
//! Each tag maps to exactly one variant with one payload shape, in both
//! directions.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{ChatMessage, CommentAuthor, PrivateMessage, UserId};

/// A pre-serialized envelope ready for the outbound queue
pub type Frame = Arc<str>;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Liveness probe, answered with a server timestamp
    Heartbeat,
    /// Chat message to persist and broadcast
    Message(ChatContent),
}

/// Payload of a client `message` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatContent {
    pub content: String,
}

/// Raw envelope, decoded before the tag is inspected
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Reasons an inbound frame could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed envelope: {0}")]
    Malformed(serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        source: serde_json::Error,
    },
}

impl ClientMessage {
    /// Decode an inbound text frame by its tag
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Malformed)?;

        match envelope.kind.as_str() {
            "heartbeat" => Ok(ClientMessage::Heartbeat),
            "message" => serde_json::from_value(envelope.data)
                .map(ClientMessage::Message)
                .map_err(|source| DecodeError::InvalidPayload {
                    kind: "message",
                    source,
                }),
            _ => Err(DecodeError::UnknownType(envelope.kind)),
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Heartbeat { timestamp: i64 },
    Message(ChatMessage),
    OnlineCount { count: usize },
    PrivateMessage(PrivateMessageNotice),
    MessageRead { conversation_id: u64, reader_id: UserId },
    ArticleComment(CommentNotice),
    ArticleReply(CommentNotice),
    ResourceComment(CommentNotice),
    ResourceReply(CommentNotice),
    NewResource(PublishNotice),
    NewArticle(PublishNotice),
    NewCode(PublishNotice),
}

impl ServerMessage {
    /// Wire tag of this message
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Heartbeat { .. } => "heartbeat",
            ServerMessage::Message(_) => "message",
            ServerMessage::OnlineCount { .. } => "online_count",
            ServerMessage::PrivateMessage(_) => "private_message",
            ServerMessage::MessageRead { .. } => "message_read",
            ServerMessage::ArticleComment(_) => "article_comment",
            ServerMessage::ArticleReply(_) => "article_reply",
            ServerMessage::ResourceComment(_) => "resource_comment",
            ServerMessage::ResourceReply(_) => "resource_reply",
            ServerMessage::NewResource(_) => "new_resource",
            ServerMessage::NewArticle(_) => "new_article",
            ServerMessage::NewCode(_) => "new_code",
        }
    }

    /// Heartbeat echo stamped with the current unix time
    pub fn heartbeat_now() -> Self {
        ServerMessage::Heartbeat {
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Serialize into an outbound frame
    pub fn encode(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}

/// Payload of a `private_message` push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateMessageNotice {
    pub message: PrivateMessage,
    pub sender_id: UserId,
    pub message_id: u64,
}

/// Payload of the comment and reply pushes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentNotice {
    /// "article" or "resource"
    pub entity: String,
    /// "new_comment" or "new_reply"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<u64>,
    pub comment_id: u64,
    pub parent_id: u64,
    pub user_id: UserId,
    pub username: String,
    pub nickname: String,
    pub avatar: String,
    pub content: String,
    /// RFC 3339
    pub created_at: String,
    pub comment: CommentView,
    pub reply_to_user: Option<CommentAuthor>,
}

/// Full comment as rendered by comment lists, so clients can insert it directly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<u64>,
    pub user_id: UserId,
    pub parent_id: u64,
    pub root_id: u64,
    pub reply_to_user_id: Option<UserId>,
    pub content: String,
    pub like_count: i64,
    pub reply_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<CommentAuthor>,
    pub user: CommentAuthor,
    pub reply_to_user: Option<CommentAuthor>,
    pub replies: Vec<serde_json::Value>,
    pub is_liked: bool,
}

/// Payload of the `new_article`, `new_resource` and `new_code` pushes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishNotice {
    pub entity: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<serde_json::Value>,
}
