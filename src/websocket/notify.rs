//! Notification dispatch
//!
//! The seam through which request handlers outside the chat subsystem push
//! events. A [`Notifier`] is created at startup and handed to every component
//! that needs it; the hub is installed into it once before the server starts
//! listening. Until then every call logs and returns.
//!
//! Dispatch never fails the caller: delivery is best effort and presence aware.

use std::sync::{Arc, OnceLock};

use super::hub::ConnectionHub;
use super::messages::{CommentNotice, CommentView, PrivateMessageNotice, PublishNotice, ServerMessage};
use crate::models::{Comment, CommentAuthor, CommentSubject, PrivateMessage, UserId};

/// Shared handle to the process-wide hub
#[derive(Clone, Default)]
pub struct Notifier {
    hub: Arc<OnceLock<Arc<ConnectionHub>>>,
}

impl Notifier {
    /// A notifier with no hub installed yet
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier already bound to a running hub
    pub fn with_hub(hub: Arc<ConnectionHub>) -> Self {
        let notifier = Self::new();
        notifier.install(hub);
        notifier
    }

    /// Bind the hub. Only the first call takes effect.
    pub fn install(&self, hub: Arc<ConnectionHub>) -> bool {
        let installed = self.hub.set(hub).is_ok();
        if !installed {
            tracing::warn!("Connection hub already installed, ignoring");
        }
        installed
    }

    pub fn hub(&self) -> Option<&Arc<ConnectionHub>> {
        self.hub.get()
    }

    /// Tell a user a private message arrived
    pub fn private_message(&self, receiver_id: UserId, message: &PrivateMessage) {
        tracing::info!(
            receiver_id,
            message_id = message.id,
            sender_id = message.sender.id,
            "Sending private message notification"
        );
        self.unicast(receiver_id, &private_message(message));
    }

    /// Tell a message sender their conversation was read
    pub fn message_read(&self, sender_id: UserId, conversation_id: u64, reader_id: UserId) {
        tracing::info!(
            sender_id,
            conversation_id,
            reader_id,
            "Sending message read notification"
        );
        self.unicast(
            sender_id,
            &ServerMessage::MessageRead {
                conversation_id,
                reader_id,
            },
        );
    }

    /// Announce a new comment or reply on an article or resource
    pub fn comment(&self, comment: &Comment, author: &CommentAuthor, reply_to: Option<&CommentAuthor>) {
        let message = comment_message(comment, author, reply_to);
        tracing::info!(
            comment_id = comment.id,
            user_id = comment.user_id,
            kind = message.kind(),
            "Broadcasting comment notification"
        );
        self.broadcast(&message);
    }

    /// Announce a newly published article
    pub fn new_article(&self, article: serde_json::Value) {
        self.broadcast(&new_article(article));
    }

    /// Announce a newly published resource
    pub fn new_resource(&self, resource: serde_json::Value) {
        self.broadcast(&new_resource(resource));
    }

    /// Announce a newly published code snippet
    pub fn new_code_snippet(&self, snippet: serde_json::Value) {
        self.broadcast(&new_code_snippet(snippet));
    }

    fn unicast(&self, user_id: UserId, message: &ServerMessage) {
        let Some(hub) = self.hub() else {
            tracing::warn!(kind = message.kind(), "Connection hub not initialized, notification skipped");
            return;
        };
        if let Err(e) = hub.send_to_user(user_id, message) {
            tracing::error!(user_id, kind = message.kind(), error = %e, "Failed to send notification");
        }
    }

    fn broadcast(&self, message: &ServerMessage) {
        let Some(hub) = self.hub() else {
            tracing::warn!(kind = message.kind(), "Connection hub not initialized, notification skipped");
            return;
        };
        if let Err(e) = hub.broadcast_to_all(message) {
            tracing::error!(kind = message.kind(), error = %e, "Failed to broadcast notification");
        }
    }
}

pub fn private_message(message: &PrivateMessage) -> ServerMessage {
    ServerMessage::PrivateMessage(PrivateMessageNotice {
        message: message.clone(),
        sender_id: message.sender.id,
        message_id: message.id,
    })
}

/// Build the comment push. Replies (non-zero parent) get the `*_reply` tag.
pub fn comment_message(
    comment: &Comment,
    author: &CommentAuthor,
    reply_to: Option<&CommentAuthor>,
) -> ServerMessage {
    let (entity, article_id, resource_id) = match comment.subject {
        CommentSubject::Article(id) => ("article", Some(id), None),
        CommentSubject::Resource(id) => ("resource", None, Some(id)),
    };
    let is_article = article_id.is_some();
    let kind = if comment.is_reply() { "new_reply" } else { "new_comment" };
    let created_at = comment.created_at.to_rfc3339();

    // Article comment lists also carry status, updated_at and an author alias
    let view = CommentView {
        id: comment.id,
        article_id,
        resource_id,
        user_id: comment.user_id,
        parent_id: comment.parent_id,
        root_id: comment.root_id,
        reply_to_user_id: comment.reply_to_user_id,
        content: comment.content.clone(),
        like_count: comment.like_count,
        reply_count: comment.reply_count,
        status: is_article.then_some(comment.status),
        created_at: created_at.clone(),
        updated_at: is_article.then(|| comment.updated_at.to_rfc3339()),
        author: is_article.then(|| author.clone()),
        user: author.clone(),
        reply_to_user: reply_to.cloned(),
        replies: Vec::new(),
        is_liked: false,
    };

    let notice = CommentNotice {
        entity: entity.to_string(),
        kind: kind.to_string(),
        article_id,
        resource_id,
        comment_id: comment.id,
        parent_id: comment.parent_id,
        user_id: comment.user_id,
        username: author.username.clone(),
        nickname: author.nickname.clone(),
        avatar: author.avatar.clone(),
        content: comment.content.clone(),
        created_at,
        comment: view,
        reply_to_user: reply_to.cloned(),
    };

    match (comment.subject, comment.is_reply()) {
        (CommentSubject::Article(_), false) => ServerMessage::ArticleComment(notice),
        (CommentSubject::Article(_), true) => ServerMessage::ArticleReply(notice),
        (CommentSubject::Resource(_), false) => ServerMessage::ResourceComment(notice),
        (CommentSubject::Resource(_), true) => ServerMessage::ResourceReply(notice),
    }
}

pub fn new_article(article: serde_json::Value) -> ServerMessage {
    ServerMessage::NewArticle(PublishNotice {
        entity: "article".to_string(),
        kind: "new_article".to_string(),
        article: Some(article),
        resource: None,
        snippet: None,
    })
}

pub fn new_resource(resource: serde_json::Value) -> ServerMessage {
    ServerMessage::NewResource(PublishNotice {
        entity: "resource".to_string(),
        kind: "new_resource".to_string(),
        article: None,
        resource: Some(resource),
        snippet: None,
    })
}

pub fn new_code_snippet(snippet: serde_json::Value) -> ServerMessage {
    ServerMessage::NewCode(PublishNotice {
        entity: "code".to_string(),
        kind: "new_code".to_string(),
        article: None,
        resource: None,
        snippet: Some(snippet),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebSocketConfig;
    use crate::models::{ConversationUser, OnlineUser};
    use crate::services::{MemoryChatStore, MemoryUserDirectory};
    use crate::websocket::connection::Connection;
    use crate::websocket::messages::Frame;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn author(id: UserId) -> CommentAuthor {
        CommentAuthor {
            id,
            username: format!("user{}", id),
            nickname: format!("User {}", id),
            avatar: format!("/avatars/{}.png", id),
        }
    }

    fn comment(subject: CommentSubject, parent_id: u64) -> Comment {
        let now = Utc::now();
        Comment {
            id: 11,
            subject,
            user_id: 1,
            parent_id,
            root_id: parent_id,
            reply_to_user_id: (parent_id > 0).then_some(2),
            content: "great post".to_string(),
            like_count: 0,
            reply_count: 0,
            status: 1,
            created_at: now,
            updated_at: now,
        }
    }

    async fn next_message(rx: &mut mpsc::Receiver<Frame>) -> ServerMessage {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&frame).unwrap()
    }

    #[test]
    fn test_article_comment_payload() {
        let message = comment_message(&comment(CommentSubject::Article(4), 0), &author(1), None);
        assert_eq!(message.kind(), "article_comment");

        let value = serde_json::to_value(&message).unwrap();
        let data = &value["data"];
        assert_eq!(data["entity"], "article");
        assert_eq!(data["type"], "new_comment");
        assert_eq!(data["article_id"], 4);
        assert!(data.get("resource_id").is_none());
        assert_eq!(data["username"], "user1");
        assert!(data["reply_to_user"].is_null());
        assert_eq!(data["comment"]["author"]["id"], 1);
        assert_eq!(data["comment"]["status"], 1);
        assert_eq!(data["comment"]["replies"], json!([]));
        assert_eq!(data["comment"]["is_liked"], false);
    }

    #[test]
    fn test_resource_reply_payload() {
        let reply_to = author(2);
        let message = comment_message(
            &comment(CommentSubject::Resource(9), 5),
            &author(1),
            Some(&reply_to),
        );
        assert_eq!(message.kind(), "resource_reply");

        let value = serde_json::to_value(&message).unwrap();
        let data = &value["data"];
        assert_eq!(data["entity"], "resource");
        assert_eq!(data["type"], "new_reply");
        assert_eq!(data["resource_id"], 9);
        assert_eq!(data["parent_id"], 5);
        assert_eq!(data["reply_to_user"]["username"], "user2");
        assert_eq!(data["comment"]["reply_to_user_id"], 2);
        assert!(data["comment"].get("author").is_none());
        assert!(data["comment"].get("status").is_none());
    }

    #[test]
    fn test_article_reply_tag() {
        let message = comment_message(&comment(CommentSubject::Article(4), 3), &author(1), Some(&author(2)));
        assert!(matches!(message, ServerMessage::ArticleReply(_)));
    }

    #[test]
    fn test_publish_payloads() {
        let value = serde_json::to_value(new_code_snippet(json!({"id": 3}))).unwrap();
        assert_eq!(
            value,
            json!({"type": "new_code", "data": {"entity": "code", "type": "new_code", "snippet": {"id": 3}}})
        );

        let value = serde_json::to_value(new_resource(json!({"id": 4}))).unwrap();
        assert_eq!(value["data"]["resource"]["id"], 4);
        assert_eq!(value["data"]["entity"], "resource");

        let value = serde_json::to_value(new_article(json!({"id": 5}))).unwrap();
        assert_eq!(value["type"], "new_article");
        assert_eq!(value["data"]["article"]["id"], 5);
    }

    #[test]
    fn test_uninitialized_notifier_is_a_no_op() {
        let notifier = Notifier::new();
        assert!(notifier.hub().is_none());

        notifier.message_read(1, 2, 3);
        notifier.new_article(json!({"id": 1}));
        notifier.comment(&comment(CommentSubject::Article(1), 0), &author(1), None);
    }

    #[tokio::test]
    async fn test_install_once() {
        let first = ConnectionHub::start(
            WebSocketConfig::default(),
            Arc::new(MemoryChatStore::new()),
            Arc::new(MemoryUserDirectory::new()),
        );
        let second = ConnectionHub::start(
            WebSocketConfig::default(),
            Arc::new(MemoryChatStore::new()),
            Arc::new(MemoryUserDirectory::new()),
        );

        let notifier = Notifier::new();
        let clone = notifier.clone();
        assert!(notifier.install(Arc::clone(&first)));
        assert!(!notifier.install(second));

        // Clones share the installed hub
        assert!(Arc::ptr_eq(clone.hub().unwrap(), &first));
    }

    #[tokio::test]
    async fn test_private_message_reaches_only_receiver() {
        let hub = ConnectionHub::start(
            WebSocketConfig::default(),
            Arc::new(MemoryChatStore::new()),
            Arc::new(MemoryUserDirectory::new()),
        );
        let notifier = Notifier::with_hub(Arc::clone(&hub));

        let online = |id: UserId| OnlineUser {
            user_id: id,
            username: format!("user{}", id),
            nickname: String::new(),
            avatar: String::new(),
        };
        let (sender, mut sender_rx) = Connection::new(online(1), "127.0.0.1", 8, 3);
        let (receiver, mut receiver_rx) = Connection::new(online(2), "127.0.0.1", 8, 3);
        hub.register(sender).await.unwrap();
        hub.register(receiver).await.unwrap();
        next_message(&mut sender_rx).await;
        next_message(&mut sender_rx).await;
        next_message(&mut receiver_rx).await;

        let participant = |id: UserId| ConversationUser {
            id,
            username: format!("user{}", id),
            nickname: String::new(),
            avatar: String::new(),
        };
        let message = PrivateMessage {
            id: 77,
            conversation_id: 5,
            sender: participant(1),
            receiver: participant(2),
            content: "hello".to_string(),
            is_read: false,
            is_self: false,
            created_at: Utc::now(),
        };
        notifier.private_message(2, &message);

        match next_message(&mut receiver_rx).await {
            ServerMessage::PrivateMessage(notice) => {
                assert_eq!(notice.message_id, 77);
                assert_eq!(notice.sender_id, 1);
                assert_eq!(notice.message.content, "hello");
            }
            other => panic!("expected private message, got {:?}", other),
        }
        assert!(sender_rx.try_recv().is_err());

        // Offline receiver: silently skipped
        notifier.private_message(99, &message);
    }

    #[tokio::test]
    async fn test_comment_broadcast_reaches_everyone() {
        let hub = ConnectionHub::start(
            WebSocketConfig::default(),
            Arc::new(MemoryChatStore::new()),
            Arc::new(MemoryUserDirectory::new()),
        );
        let notifier = Notifier::with_hub(Arc::clone(&hub));
        let (conn, mut rx) = Connection::new(
            OnlineUser {
                user_id: 3,
                username: "carol".to_string(),
                nickname: String::new(),
                avatar: String::new(),
            },
            "127.0.0.1",
            8,
            3,
        );
        hub.register(conn).await.unwrap();
        next_message(&mut rx).await;

        notifier.comment(&comment(CommentSubject::Resource(2), 0), &author(1), None);

        assert_eq!(next_message(&mut rx).await.kind(), "resource_comment");
    }
}
