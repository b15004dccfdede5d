//! Live connection hub
//!
//! Each realtime connection owns a bounded outbound queue drained by its
//! socket writer task. The hub serializes an event once and pushes it onto
//! every addressed queue without waiting; a full or closed queue drops the
//! event for that connection only.

use crate::error::Result;
use crate::fanout::publisher::{Delivery, EventPublisher};
use crate::metrics::MetricsCollector;
use crate::types::{ConnectionId, ServerEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

/// A connected realtime client
pub struct ClientConnection {
    pub id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    pub connected_at: Instant,
    /// Events dropped because the queue was full or closed
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a frame. Returns `false` and counts a drop when the queue is
    /// full or closed.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

/// Registry of live connections used as the production publisher
pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    metrics: Arc<MetricsCollector>,
}

impl ConnectionHub {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Register a connection and return the receiving end of its queue
    pub async fn register(
        &self,
        id: ConnectionId,
        queue_size: usize,
    ) -> mpsc::Receiver<Arc<String>> {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let connection = Arc::new(ClientConnection::new(id, tx));
        self.connections.write().await.insert(id, connection);
        self.metrics.record_connection_opened();
        debug!("Registered connection {}", id);
        rx
    }

    /// Remove a connection. Unknown ids are ignored.
    pub async fn unregister(&self, id: ConnectionId) {
        if let Some(connection) = self.connections.write().await.remove(&id) {
            self.metrics.record_connection_closed();
            debug!(
                "Unregistered connection {} after {:?} ({} dropped events)",
                id,
                connection.connected_at.elapsed(),
                connection.drop_count()
            );
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn get(&self, id: ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().await.get(&id).cloned()
    }

    fn deliver(&self, connection: &ClientConnection, frame: &Arc<String>, event: &str) {
        if !connection.send(frame.clone()) {
            self.metrics.record_dropped_delivery();
            warn!(
                "Dropped '{}' for connection {} (queue full or closed, {} dropped so far)",
                event,
                connection.id,
                connection.drop_count()
            );
        }
    }
}

#[async_trait]
impl EventPublisher for ConnectionHub {
    async fn publish(&self, delivery: Delivery, event: ServerEvent) -> Result<()> {
        let name = event.name();
        let frame = Arc::new(serde_json::to_string(&event)?);
        self.metrics.record_event_published(name, delivery.scope());

        let connections = self.connections.read().await;
        match &delivery {
            Delivery::Direct(id) => {
                if let Some(connection) = connections.get(id) {
                    self.deliver(connection, &frame, name);
                } else {
                    debug!("Skipping '{}' for departed connection {}", name, id);
                }
            }
            Delivery::Room {
                room_id,
                recipients,
            } => {
                debug!(
                    "Fanning out '{}' to {} members of room {}",
                    name,
                    recipients.len(),
                    room_id
                );
                for id in recipients {
                    if let Some(connection) = connections.get(id) {
                        self.deliver(connection, &frame, name);
                    }
                }
            }
            Delivery::Global => {
                for connection in connections.values() {
                    self.deliver(connection, &frame, name);
                }
            }
        }

        Ok(())
    }
}
