use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};
use warp::ws::Message;

use super::messages::PollEvent;

pub type ConnectionId = u64;

/// Room and identity a connection announced with its join message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub room_code: String,
    pub user: String,
    pub is_admin: bool,
}

struct ConnectionEntry {
    sender: mpsc::UnboundedSender<Message>,
    binding: Option<Binding>,
}

/// Every live WebSocket, with its outbox and optional room binding.
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Track a new, unbound connection.
    pub async fn register(&self, sender: mpsc::UnboundedSender<Message>) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.write().await;
        connections.insert(
            id,
            ConnectionEntry {
                sender,
                binding: None,
            },
        );
        id
    }

    /// Attach `binding` to a connection, replacing any earlier one.
    /// Returns false if the connection is not registered.
    pub async fn bind(&self, id: ConnectionId, binding: Binding) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(&id) {
            Some(entry) => {
                if let Some(previous) = entry.binding.replace(binding) {
                    tracing::debug!(
                        connection_id = id,
                        previous_room = %previous.room_code,
                        "Connection rebound to a new room"
                    );
                }
                true
            }
            None => false,
        }
    }

    pub async fn binding(&self, id: ConnectionId) -> Option<Binding> {
        let connections = self.connections.read().await;
        connections.get(&id).and_then(|entry| entry.binding.clone())
    }

    /// Forget a connection, returning its binding if it had one.
    pub async fn unregister(&self, id: ConnectionId) -> Option<Binding> {
        let mut connections = self.connections.write().await;
        connections.remove(&id).and_then(|entry| entry.binding)
    }

    /// Fan `event` out to every open connection bound to `room_code`.
    /// Returns how many connections accepted it.
    pub async fn broadcast(&self, room_code: &str, event: &PollEvent) -> usize {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(room_code = %room_code, error = %e, "Failed to serialize event");
                return 0;
            }
        };

        let connections = self.connections.read().await;
        let mut delivered = 0;

        for (id, entry) in connections.iter() {
            let bound_here = entry
                .binding
                .as_ref()
                .is_some_and(|binding| binding.room_code == room_code);
            if !bound_here {
                continue;
            }

            match entry.sender.send(Message::text(payload.clone())) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::debug!(connection_id = id, room_code = %room_code, "Skipping closed connection");
                }
            }
        }

        tracing::trace!(room_code = %room_code, delivered, "Broadcast event");
        delivered
    }

    pub async fn bound_count(&self, room_code: &str) -> usize {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|entry| {
                entry
                    .binding
                    .as_ref()
                    .is_some_and(|binding| binding.room_code == room_code)
            })
            .count()
    }

    /// Open connections, bound or not.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
