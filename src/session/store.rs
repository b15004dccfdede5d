//! Session store: the room directory and connection registry as one unit
//!
//! Membership changes touch both halves, so they are only ever mutated
//! together under the manager's lock.

use crate::error::{RelayError, Result};
use crate::room::{DirectoryConfig, RoomDirectory};
use crate::session::registry::ConnectionRegistry;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct SessionStore {
    pub directory: RoomDirectory,
    pub registry: ConnectionRegistry,
    next_epoch: u64,
}

impl SessionStore {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            directory: RoomDirectory::new(config),
            registry: ConnectionRegistry::new(),
            next_epoch: 0,
        }
    }

    /// Hand out the epoch for a new join
    pub fn next_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    /// Check the cross-structure invariants
    pub fn verify_invariants(&self) -> Result<()> {
        let mut codes = HashSet::new();
        for room in self.directory.list() {
            if !codes.insert(room.invite_code().to_string()) {
                return Err(invariant(format!(
                    "duplicate invite code {}",
                    room.invite_code()
                )));
            }
            if room.current_users() > room.max_users() {
                return Err(invariant(format!("room {} over capacity", room.id())));
            }

            let mut sides = HashSet::new();
            for participant in room.users() {
                if !sides.insert(participant.side) {
                    return Err(invariant(format!(
                        "room {} has two participants on {}",
                        room.id(),
                        participant.side
                    )));
                }
                if room.holder(participant.side) != Some(participant.connection_id) {
                    return Err(invariant(format!(
                        "room {} seats {} on {} but the slot disagrees",
                        room.id(),
                        participant.connection_id,
                        participant.side
                    )));
                }
                match self.registry.participant(participant.connection_id) {
                    Some(registered) if registered == participant => {}
                    _ => {
                        return Err(invariant(format!(
                            "participant {} in room {} is not registered",
                            participant.connection_id,
                            room.id()
                        )))
                    }
                }
            }
        }

        for participant in self.registry.participants() {
            let in_room = self
                .directory
                .lookup_by_id(participant.room_id)
                .map(|room| {
                    room.users()
                        .iter()
                        .any(|p| p.connection_id == participant.connection_id)
                })
                .unwrap_or(false);
            if !in_room {
                return Err(invariant(format!(
                    "connection {} is joined to missing room {}",
                    participant.connection_id, participant.room_id
                )));
            }
        }

        Ok(())
    }
}

fn invariant(message: String) -> anyhow::Error {
    RelayError::Internal {
        message: format!("invariant violated: {}", message),
    }
    .into()
}
