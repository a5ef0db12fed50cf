//! Real-Time Chat over WebSocket
//!
//! One hub per process tracks every connected user and fans chat messages and
//! notifications out to them.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Owns the registry; a single control loop applies
//!   register, unregister and broadcast in order
//! - **Connection**: Per-socket state shared by the hub and both pumps
//! - **Pumps**: ReadPump validates, rate limits and persists inbound chat;
//!   WritePump drains the outbound queue, coalescing frames, and sends pings
//! - **Handler**: Authenticated upgrade at `/api/v1/chat/ws`
//! - **Notifier**: Push helpers used by the rest of the application
//!
//! ## Protocol
//!
//! Every frame is a JSON envelope `{"type": ..., "data": ...}`. Clients send
//! `heartbeat` and `message`; the server sends those plus `online_count`,
//! private message, comment and publish notifications.
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8080/api/v1/chat/ws');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'message', data: {content: 'hello'}}));
//! };
//!
//! ws.onmessage = (event) => {
//!   // One frame may carry several envelopes separated by '\n'
//!   for (const line of event.data.split('\n')) {
//!     console.log('Received:', JSON.parse(line));
//!   }
//! };
//! ```

mod connection;
mod handler;
mod hub;
mod messages;
pub mod notify;
mod pumps;
mod rate_limit;

pub use connection::{Connection, ConnectionId, ConnectionState, EnqueueOutcome};
pub use handler::{chat_websocket_handler, client_ip, origin_allowed};
pub use hub::{ConnectionHub, HubError};
pub use messages::{
    ChatContent, ClientMessage, CommentNotice, CommentView, DecodeError, Frame,
    PrivateMessageNotice, PublishNotice, ServerMessage,
};
pub use notify::Notifier;
pub use pumps::{validate_content, ContentRejection, FRAME_OVERHEAD_RESERVE};
pub use rate_limit::RateLimiter;
