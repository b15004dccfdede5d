//! Event publishing interface for the fan-out engine
//!
//! The session manager hands every outbound event to an [`EventPublisher`]
//! together with a [`Delivery`] scope. Publishing never fails a lifecycle
//! operation; implementations drop what they cannot deliver.

use crate::error::Result;
use crate::types::{ConnectionId, RoomId, ServerEvent};
use async_trait::async_trait;

/// Who receives an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A single connection
    Direct(ConnectionId),
    /// Members of one room, resolved when the event was produced
    Room {
        room_id: RoomId,
        recipients: Vec<ConnectionId>,
    },
    /// Every live connection
    Global,
}

impl Delivery {
    /// Scope label used in logs and metrics
    pub fn scope(&self) -> &'static str {
        match self {
            Delivery::Direct(_) => "direct",
            Delivery::Room { .. } => "room",
            Delivery::Global => "global",
        }
    }

    /// Whether a connection is addressed by this delivery
    pub fn includes(&self, connection_id: ConnectionId) -> bool {
        match self {
            Delivery::Direct(target) => *target == connection_id,
            Delivery::Room { recipients, .. } => recipients.contains(&connection_id),
            Delivery::Global => true,
        }
    }
}

/// Trait for delivering server events to connections
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Deliver an event to the connections addressed by `delivery`
    async fn publish(&self, delivery: Delivery, event: ServerEvent) -> Result<()>;
}

/// Publisher that records every event instead of delivering it
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published_events: std::sync::Mutex<Vec<(Delivery, ServerEvent)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every published event in publish order
    pub fn events(&self) -> Vec<(Delivery, ServerEvent)> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events a given connection would have received, in order
    pub fn received_by(&self, connection_id: ConnectionId) -> Vec<ServerEvent> {
        self.events()
            .into_iter()
            .filter(|(delivery, _)| delivery.includes(connection_id))
            .map(|(_, event)| event)
            .collect()
    }

    /// Number of published events with the given wire name
    pub fn count_events_named(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|(_, event)| event.name() == name)
            .count()
    }

    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, delivery: Delivery, event: ServerEvent) -> Result<()> {
        if let Ok(mut events) = self.published_events.lock() {
            events.push((delivery, event));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{generate_connection_id, generate_room_id};

    #[test]
    fn test_delivery_includes() {
        let a = generate_connection_id();
        let b = generate_connection_id();

        assert!(Delivery::Direct(a).includes(a));
        assert!(!Delivery::Direct(a).includes(b));
        assert!(Delivery::Global.includes(b));

        let room = Delivery::Room {
            room_id: generate_room_id(),
            recipients: vec![a],
        };
        assert!(room.includes(a));
        assert!(!room.includes(b));
        assert_eq!(room.scope(), "room");
    }

    #[tokio::test]
    async fn test_recording_publisher() {
        let publisher = RecordingPublisher::new();
        let a = generate_connection_id();
        let b = generate_connection_id();

        publisher
            .publish(
                Delivery::Direct(a),
                ServerEvent::Error {
                    message: "bad frame".to_string(),
                },
            )
            .await
            .unwrap();
        publisher
            .publish(Delivery::Global, ServerEvent::RoomListUpdate { rooms: vec![] })
            .await
            .unwrap();

        assert_eq!(publisher.events().len(), 2);
        assert_eq!(publisher.received_by(a).len(), 2);
        assert_eq!(publisher.received_by(b).len(), 1);
        assert_eq!(publisher.count_events_named("roomListUpdate"), 1);

        publisher.clear_events();
        assert!(publisher.events().is_empty());
    }
}
