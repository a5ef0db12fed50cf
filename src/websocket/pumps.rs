//! Read and write pumps
//!
//! Each connection runs two tasks bridging its socket to the hub:
//! - the read pump decodes inbound frames, answers heartbeats, validates and
//!   rate-limits chat messages, persists them and hands them to the hub
//! - the write pump drains the outbound queue, coalescing frames that are
//!   already waiting into one physical write, and pings on a timer
//!
//! Both are generic over the socket halves so they can run against in-memory
//! channels as well as a real `WebSocket`.

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use super::connection::{closed, Connection, EnqueueOutcome};
use super::hub::ConnectionHub;
use super::messages::{ClientMessage, DecodeError, Frame, ServerMessage};
use crate::config::WebSocketConfig;
use crate::models::NewChatMessage;

/// Bytes reserved for envelope and record fields when a chat message is broadcast
pub const FRAME_OVERHEAD_RESERVE: usize = 600;

/// Why a chat message was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentRejection {
    #[error("empty after trimming")]
    Empty,

    #[error("{length} characters exceeds limit of {max}")]
    TooManyChars { length: usize, max: usize },

    #[error("{bytes} bytes exceeds limit of {max}")]
    TooManyBytes { bytes: usize, max: usize },
}

/// Trim and bound chat content
pub fn validate_content<'a>(
    raw: &'a str,
    config: &WebSocketConfig,
) -> Result<&'a str, ContentRejection> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ContentRejection::Empty);
    }

    let length = content.chars().count();
    if length > config.max_message_length {
        return Err(ContentRejection::TooManyChars {
            length,
            max: config.max_message_length,
        });
    }

    let max_bytes = config.max_frame_size.saturating_sub(FRAME_OVERHEAD_RESERVE);
    if content.len() > max_bytes {
        return Err(ContentRejection::TooManyBytes {
            bytes: content.len(),
            max: max_bytes,
        });
    }

    Ok(content)
}

/// Run both pumps for a registered connection until the socket is torn down
pub(crate) async fn run_session<W, R>(
    hub: Arc<ConnectionHub>,
    conn: Arc<Connection>,
    outbound: mpsc::Receiver<Frame>,
    sink: W,
    stream: R,
) where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let writer = tokio::spawn(write_pump(
        Arc::clone(&conn),
        hub.config().clone(),
        outbound,
        sink,
    ));

    read_pump(Arc::clone(&hub), Arc::clone(&conn), stream).await;

    if let Err(e) = writer.await {
        tracing::error!(user_id = conn.user_id(), error = %e, "Write pump panicked");
    }
    conn.mark_closed();
    tracing::debug!(user_id = conn.user_id(), connection_id = %conn.id(), "Connection closed");
}

/// Pump inbound frames until the socket fails, closes, or is closed for us
pub(crate) async fn read_pump<R>(hub: Arc<ConnectionHub>, conn: Arc<Connection>, mut stream: R)
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let pong_wait = hub.config().pong_wait();
    let mut deadline = Instant::now() + pong_wait;
    let mut close_signal = conn.close_signal();

    loop {
        let next = tokio::select! {
            _ = closed(&mut close_signal) => break,
            next = time::timeout_at(deadline, stream.next()) => next,
        };

        let message = match next {
            Err(_) => {
                tracing::warn!(user_id = conn.user_id(), "Read deadline exceeded");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                // Includes frames over the transport cap
                tracing::warn!(
                    user_id = conn.user_id(),
                    connection_id = %conn.id(),
                    error = %e,
                    "WebSocket read failed, closing connection"
                );
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => handle_text(&hub, &conn, &text).await,
            Message::Pong(_) => {
                deadline = Instant::now() + pong_wait;
            }
            // The transport answers pings itself
            Message::Ping(_) => {}
            Message::Binary(_) => {
                tracing::warn!(user_id = conn.user_id(), "Binary frame ignored");
            }
            Message::Close(_) => {
                tracing::debug!(user_id = conn.user_id(), "Client requested close");
                break;
            }
        }
    }

    hub.unregister(&conn);
    conn.close_socket();
}

async fn handle_text(hub: &ConnectionHub, conn: &Connection, text: &str) {
    let config = hub.config();
    if text.len() > config.max_frame_size {
        tracing::warn!(
            user_id = conn.user_id(),
            bytes = text.len(),
            max = config.max_frame_size,
            "Frame too large"
        );
        return;
    }

    match ClientMessage::decode(text) {
        Ok(ClientMessage::Heartbeat) => reply_heartbeat(conn),
        Ok(ClientMessage::Message(chat)) => handle_chat(hub, conn, &chat.content).await,
        Err(DecodeError::UnknownType(kind)) => {
            tracing::warn!(user_id = conn.user_id(), kind = %kind, "Unknown message type");
        }
        Err(e) => {
            tracing::warn!(user_id = conn.user_id(), error = %e, "Failed to decode message");
        }
    }
}

fn reply_heartbeat(conn: &Connection) {
    let frame = match ServerMessage::heartbeat_now().encode() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode heartbeat");
            return;
        }
    };
    if conn.enqueue(frame) == EnqueueOutcome::Full {
        tracing::warn!(user_id = conn.user_id(), "Heartbeat response buffer full");
    }
}

async fn handle_chat(hub: &ConnectionHub, conn: &Connection, raw: &str) {
    let content = match validate_content(raw, hub.config()) {
        Ok(content) => content,
        Err(reason) => {
            tracing::warn!(user_id = conn.user_id(), reason = %reason, "Chat message rejected");
            return;
        }
    };

    if !conn.allow_message(std::time::Instant::now()) {
        tracing::warn!(user_id = conn.user_id(), "Rate limit exceeded");
        return;
    }

    let user = conn.user();
    let draft = NewChatMessage {
        user_id: user.user_id,
        username: user.username.clone(),
        nickname: user.nickname.clone(),
        avatar: user.avatar.clone(),
        content: content.to_string(),
        ip_address: conn.ip_address().to_string(),
    };

    let stored = match hub.store().save_message(draft).await {
        Ok(stored) => stored,
        Err(e) => {
            tracing::error!(user_id = conn.user_id(), error = %e, "Failed to save message");
            return;
        }
    };

    let message_id = stored.id;
    let frame = match ServerMessage::Message(stored).encode() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode chat message");
            return;
        }
    };

    if let Err(e) = hub.broadcast(frame) {
        tracing::error!(user_id = conn.user_id(), message_id, error = %e, "Failed to broadcast chat message");
    }
}

/// Drain the outbound queue to the socket until it closes or a write fails
pub(crate) async fn write_pump<W>(
    conn: Arc<Connection>,
    config: WebSocketConfig,
    mut outbound: mpsc::Receiver<Frame>,
    mut sink: W,
) where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let write_wait = config.write_wait();
    let ping_period = config.ping_period();
    let mut ticker = time::interval_at(Instant::now() + ping_period, ping_period);
    let mut close_signal = conn.close_signal();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(first) = frame else {
                    // Hub closed the queue
                    let _ = write_with_deadline(&mut sink, Message::Close(None), write_wait).await;
                    break;
                };

                let mut payload = String::from(&*first);
                while let Ok(next) = outbound.try_recv() {
                    payload.push('\n');
                    payload.push_str(&next);
                }

                if let Err(e) = write_with_deadline(&mut sink, Message::Text(payload), write_wait).await {
                    tracing::debug!(user_id = conn.user_id(), error = %e, "WebSocket write failed");
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = write_with_deadline(&mut sink, Message::Ping(Vec::new()), write_wait).await {
                    tracing::debug!(user_id = conn.user_id(), error = %e, "WebSocket ping failed");
                    break;
                }
            }
            _ = closed(&mut close_signal) => {
                let _ = write_with_deadline(&mut sink, Message::Close(None), write_wait).await;
                break;
            }
        }
    }

    conn.close_socket();
    let _ = time::timeout(write_wait, sink.close()).await;
}

async fn write_with_deadline<W>(
    sink: &mut W,
    message: Message,
    write_wait: std::time::Duration,
) -> Result<(), String>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    match time::timeout(write_wait, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("write deadline exceeded".to_string()),
    }
}
