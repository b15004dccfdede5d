//! Connection registry: live connection -> participant session

use crate::error::{RelayError, Result};
use crate::types::{ConnectionId, Participant};
use std::collections::HashMap;

/// Per-connection join state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unjoined,
    Joined(Participant),
}

impl ConnectionState {
    pub fn participant(&self) -> Option<&Participant> {
        match self {
            ConnectionState::Unjoined => None,
            ConnectionState::Joined(participant) => Some(participant),
        }
    }
}

/// Registry of connections and the room session each one holds
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened connection
    pub fn connect(&mut self, connection_id: ConnectionId) {
        self.connections
            .entry(connection_id)
            .or_insert(ConnectionState::Unjoined);
    }

    /// Forget a connection, returning its last state
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<ConnectionState> {
        self.connections.remove(&connection_id)
    }

    /// State of a connection. Unknown connections count as unjoined.
    pub fn state(&self, connection_id: ConnectionId) -> ConnectionState {
        self.connections
            .get(&connection_id)
            .cloned()
            .unwrap_or(ConnectionState::Unjoined)
    }

    pub fn participant(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.connections
            .get(&connection_id)
            .and_then(ConnectionState::participant)
    }

    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    pub fn is_joined(&self, connection_id: ConnectionId) -> bool {
        self.participant(connection_id).is_some()
    }

    /// Move a connection to `Joined`
    pub fn bind(&mut self, participant: Participant) -> Result<()> {
        let connection_id = participant.connection_id;
        let state = self
            .connections
            .entry(connection_id)
            .or_insert(ConnectionState::Unjoined);

        if let ConnectionState::Joined(_) = state {
            return Err(RelayError::AlreadyJoined {
                connection_id: connection_id.to_string(),
            }
            .into());
        }

        *state = ConnectionState::Joined(participant);
        Ok(())
    }

    /// Move a connection back to `Unjoined`, returning the session it held
    pub fn unbind(&mut self, connection_id: ConnectionId) -> Option<Participant> {
        let state = self.connections.get_mut(&connection_id)?;
        match std::mem::replace(state, ConnectionState::Unjoined) {
            ConnectionState::Joined(participant) => Some(participant),
            ConnectionState::Unjoined => None,
        }
    }

    pub fn connected_count(&self) -> usize {
        self.connections.len()
    }

    pub fn joined_count(&self) -> usize {
        self.connections
            .values()
            .filter(|state| state.participant().is_some())
            .count()
    }

    /// Every joined participant
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.connections.values().filter_map(ConnectionState::participant)
    }
}
