//! WebSocket Connection Hub
//!
//! Sole owner of the client registry. Registration, unregistration and
//! broadcast fan-out all pass through one control loop task, which gives them
//! a total order: a "count the clients" step can never interleave with a
//! "send to every client" step.
//!
//! Reads (`online_count`, `online_users`, `send_to_user`) take the registry's
//! read lock directly and never wait on the loop.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::connection::{Connection, EnqueueOutcome};
use super::messages::{Frame, ServerMessage};
use crate::config::WebSocketConfig;
use crate::models::{OnlineUser, UserId};
use crate::services::{ChatMessageStore, UserDirectory};

type Registry = Arc<RwLock<HashMap<UserId, Arc<Connection>>>>;

/// Process-wide registry of live connections
pub struct ConnectionHub {
    clients: Registry,
    register_tx: mpsc::UnboundedSender<Registration>,
    unregister_tx: mpsc::UnboundedSender<Arc<Connection>>,
    broadcast_tx: mpsc::Sender<Frame>,
    store: Arc<dyn ChatMessageStore>,
    directory: Arc<dyn UserDirectory>,
    config: WebSocketConfig,
}

struct Registration {
    conn: Arc<Connection>,
    ack: oneshot::Sender<()>,
}

impl ConnectionHub {
    /// Create the hub and spawn its control loop on the current runtime
    pub fn start(
        config: WebSocketConfig,
        store: Arc<dyn ChatMessageStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Arc<Self> {
        let (hub, control) = Self::build(config, store, directory);
        tokio::spawn(control.run());
        tracing::info!(
            broadcast_buffer = hub.config.broadcast_buffer_size,
            client_buffer = hub.config.client_send_buffer_size,
            "Connection hub started"
        );
        hub
    }

    fn build(
        config: WebSocketConfig,
        store: Arc<dyn ChatMessageStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> (Arc<Self>, ControlLoop) {
        let clients: Registry = Arc::new(RwLock::new(HashMap::new()));
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_buffer_size.max(1));

        let hub = Arc::new(Self {
            clients: Arc::clone(&clients),
            register_tx,
            unregister_tx,
            broadcast_tx,
            store,
            directory,
            config,
        });

        let control = ControlLoop {
            clients,
            register_rx,
            unregister_rx,
            broadcast_rx,
        };

        (hub, control)
    }

    /// Insert a connection, evicting any previous connection of the same user.
    /// Resolves once the control loop has applied the registration.
    pub(crate) async fn register(&self, conn: Arc<Connection>) -> Result<(), HubError> {
        let (ack, done) = oneshot::channel();
        self.register_tx
            .send(Registration { conn, ack })
            .map_err(|_| HubError::Stopped)?;
        done.await.map_err(|_| HubError::Stopped)
    }

    /// Remove a connection if it is still the current one for its user
    pub(crate) fn unregister(&self, conn: &Arc<Connection>) {
        if self.unregister_tx.send(Arc::clone(conn)).is_err() {
            tracing::warn!(user_id = conn.user_id(), "Hub stopped, unregister dropped");
        }
    }

    /// Queue a pre-serialized frame for every connection
    pub(crate) fn broadcast(&self, frame: Frame) -> Result<(), HubError> {
        self.broadcast_tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => HubError::BroadcastQueueFull,
            mpsc::error::TrySendError::Closed(_) => HubError::Stopped,
        })
    }

    /// Push a message to one user if connected. An offline user is not an error.
    pub fn send_to_user(&self, user_id: UserId, message: &ServerMessage) -> Result<(), HubError> {
        let frame = message.encode()?;

        let conn = self.clients.read().get(&user_id).cloned();
        let Some(conn) = conn else {
            tracing::debug!(user_id, kind = message.kind(), "User not online, message not sent");
            return Ok(());
        };

        match conn.enqueue(frame) {
            EnqueueOutcome::Queued => {
                tracing::debug!(user_id, kind = message.kind(), "Message sent to user");
            }
            EnqueueOutcome::Full => {
                tracing::warn!(user_id, kind = message.kind(), "Client send buffer full, message dropped");
            }
            EnqueueOutcome::Closed => {
                tracing::debug!(user_id, kind = message.kind(), "Client closing, message dropped");
            }
        }
        Ok(())
    }

    /// Push a message to every connected user
    pub fn broadcast_to_all(&self, message: &ServerMessage) -> Result<(), HubError> {
        let frame = message.encode()?;
        match self.broadcast(frame) {
            Ok(()) => {
                tracing::debug!(kind = message.kind(), "Broadcast message queued");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(kind = message.kind(), error = %e, "Broadcast message dropped");
                Err(e)
            }
        }
    }

    /// Number of connected users
    pub fn online_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Snapshot of connected users
    pub fn online_users(&self) -> Vec<OnlineUser> {
        self.clients
            .read()
            .values()
            .map(|conn| conn.user().clone())
            .collect()
    }

    /// Whether the control loop is still accepting work
    pub fn is_running(&self) -> bool {
        !self.broadcast_tx.is_closed()
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn ChatMessageStore> {
        &self.store
    }

    pub(crate) fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    /// A hub whose control loop has already exited
    #[cfg(test)]
    pub(crate) fn stopped(
        config: WebSocketConfig,
        store: Arc<dyn ChatMessageStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Arc<Self> {
        let (hub, control) = Self::build(config, store, directory);
        drop(control);
        hub
    }

    #[cfg(test)]
    pub(crate) fn current(&self, user_id: UserId) -> Option<Arc<Connection>> {
        self.clients.read().get(&user_id).cloned()
    }
}

/// The single task that mutates the registry
struct ControlLoop {
    clients: Registry,
    register_rx: mpsc::UnboundedReceiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<Arc<Connection>>,
    broadcast_rx: mpsc::Receiver<Frame>,
}

impl ControlLoop {
    async fn run(mut self) {
        loop {
            // Pending unregisters first, so a disconnect observed before a
            // reconnect is applied before it
            tokio::select! {
                biased;
                Some(conn) = self.unregister_rx.recv() => {
                    self.handle_unregister(conn);
                }
                Some(registration) = self.register_rx.recv() => {
                    self.handle_register(registration);
                }
                Some(frame) = self.broadcast_rx.recv() => {
                    self.fan_out(&frame);
                }
                else => break,
            }
        }
        tracing::info!("Connection hub stopped");
    }

    fn handle_register(&self, Registration { conn, ack }: Registration) {
        let user_id = conn.user_id();

        let (previous, count) = {
            let mut clients = self.clients.write();
            // Out of the map before anything else can target it
            let previous = clients.remove(&user_id);
            clients.insert(user_id, Arc::clone(&conn));
            (previous, clients.len())
        };
        conn.mark_registered();

        if let Some(old) = previous.filter(|old| old.id() != conn.id()) {
            old.close_outbound();
            old.close_socket();
            tracing::info!(
                user_id,
                old_connection = %old.id(),
                new_connection = %conn.id(),
                "Replaced previous connection"
            );
        }

        tracing::info!(
            user_id,
            connection_id = %conn.id(),
            username = %conn.user().username,
            online = count,
            "Client connected"
        );

        // The handler may have gone away; registration stands regardless
        let _ = ack.send(());
        self.broadcast_online_count(count);
    }

    fn handle_unregister(&self, conn: Arc<Connection>) {
        let user_id = conn.user_id();

        let remaining = {
            let mut clients = self.clients.write();
            match clients.get(&user_id) {
                Some(current) if Arc::ptr_eq(current, &conn) => {
                    clients.remove(&user_id);
                    Some(clients.len())
                }
                _ => None,
            }
        };

        match remaining {
            Some(count) => {
                conn.close_outbound();
                tracing::info!(
                    user_id,
                    connection_id = %conn.id(),
                    online = count,
                    "Client disconnected"
                );
                self.broadcast_online_count(count);
            }
            None => {
                tracing::debug!(
                    user_id,
                    connection_id = %conn.id(),
                    "Ignoring unregister of replaced connection"
                );
            }
        }
    }

    /// Online count goes straight to fan-out; queueing it on our own intake
    /// could block the only consumer of that queue.
    fn broadcast_online_count(&self, count: usize) {
        match (ServerMessage::OnlineCount { count }).encode() {
            Ok(frame) => {
                self.fan_out(&frame);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode online count");
            }
        }
    }

    /// Offer a frame to every registered connection without blocking.
    /// Returns the number of connections that accepted it.
    fn fan_out(&self, frame: &Frame) -> usize {
        let clients = self.clients.read();
        let mut delivered = 0;

        for (user_id, conn) in clients.iter() {
            match conn.enqueue(Frame::clone(frame)) {
                EnqueueOutcome::Queued => delivered += 1,
                EnqueueOutcome::Full => {
                    tracing::warn!(user_id = *user_id, "Client send buffer full, frame dropped");
                }
                EnqueueOutcome::Closed => {
                    tracing::debug!(user_id = *user_id, "Client closing, frame dropped");
                }
            }
        }

        tracing::trace!(recipients = clients.len(), delivered, "Broadcast frame");
        delivered
    }
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Broadcast queue full")]
    BroadcastQueueFull,

    #[error("Connection hub stopped")]
    Stopped,

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
