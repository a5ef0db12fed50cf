//! Live connection state
//!
//! A [`Connection`] is one authenticated user's session. The hub owns it once
//! registered; the read and write pumps share it for the socket's lifetime.
//! Two close paths exist and each runs at most once:
//! - the outbound queue, closed by the hub on unregister or replacement
//! - the socket, closed by whichever pump (or the hub) notices failure first

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::messages::Frame;
use super::rate_limit::RateLimiter;
use crate::models::{OnlineUser, UserId};

/// Unique identifier for a single socket session
pub type ConnectionId = Uuid;

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded, not yet in the hub registry
    Connecting,
    /// In the registry with pumps running
    Registered,
    /// Unregister issued or socket closing
    Draining,
    /// Socket closed and both pumps exited
    Closed,
}

/// Result of a non-blocking enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queue full, frame dropped for this connection only
    Full,
    /// Outbound queue already closed
    Closed,
}

pub struct Connection {
    id: ConnectionId,
    user: OnlineUser,
    ip_address: String,
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,
    limiter: Mutex<RateLimiter>,
    state: Mutex<ConnectionState>,
    socket_closed: watch::Sender<bool>,
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue
    pub fn new(
        user: OnlineUser,
        ip_address: impl Into<String>,
        queue_depth: usize,
        max_messages_per_second: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let (socket_closed, _) = watch::channel(false);

        let conn = Arc::new(Self {
            id: Uuid::new_v4(),
            user,
            ip_address: ip_address.into(),
            outbound: Mutex::new(Some(tx)),
            limiter: Mutex::new(RateLimiter::new(max_messages_per_second)),
            state: Mutex::new(ConnectionState::Connecting),
            socket_closed,
        });

        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user.user_id
    }

    pub fn user(&self) -> &OnlineUser {
        &self.user
    }

    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Non-blocking push onto the outbound queue
    pub fn enqueue(&self, frame: Frame) -> EnqueueOutcome {
        let outbound = self.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return EnqueueOutcome::Closed;
        };

        match tx.try_send(frame) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueOutcome::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Close the outbound queue. The write pump drains what is already queued,
    /// then emits a close frame. Returns true only for the call that closed it.
    pub fn close_outbound(&self) -> bool {
        let closed = self.outbound.lock().take().is_some();
        if closed {
            self.begin_draining();
        }
        closed
    }

    pub fn is_outbound_closed(&self) -> bool {
        self.outbound.lock().is_none()
    }

    /// Signal both pumps to tear the socket down. Returns true only for the
    /// call that performed the close.
    pub fn close_socket(&self) -> bool {
        let closed = self.socket_closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
        if closed {
            self.begin_draining();
        }
        closed
    }

    pub fn is_socket_closed(&self) -> bool {
        *self.socket_closed.borrow()
    }

    /// Receiver that observes the socket close signal
    pub fn close_signal(&self) -> watch::Receiver<bool> {
        self.socket_closed.subscribe()
    }

    /// Apply the per-connection rate limit to a message arriving at `now`
    pub fn allow_message(&self, now: Instant) -> bool {
        self.limiter.lock().check(now)
    }

    pub(crate) fn mark_registered(&self) {
        let mut state = self.state.lock();
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Registered;
        }
    }

    pub(crate) fn mark_closed(&self) {
        *self.state.lock() = ConnectionState::Closed;
    }

    fn begin_draining(&self) {
        let mut state = self.state.lock();
        if matches!(*state, ConnectionState::Connecting | ConnectionState::Registered) {
            *state = ConnectionState::Draining;
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user.user_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Wait until the socket close signal fires
pub(crate) async fn closed(signal: &mut watch::Receiver<bool>) {
    // Err means the connection was dropped, which is also closed
    let _ = signal.wait_for(|closed| *closed).await;
}
