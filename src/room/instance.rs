//! Room record and seat allocation
//!
//! A room owns its ordered member list and a two-slot allocator that hands
//! out the `left` / `right` sides positionally.

use crate::error::{RelayError, Result};
use crate::types::{
    ConnectionId, Participant, ParticipantInfo, RoomId, RoomSummary, RoomView, Side, UserId,
};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};

/// Number of seats a room can hand out
pub const MAX_SLOTS: usize = 2;

/// Positional seat allocator: first free slot wins, released on leave
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotAllocator {
    slots: [Option<ConnectionId>; MAX_SLOTS],
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the first free side for a connection
    pub fn acquire(&mut self, connection_id: ConnectionId) -> Option<Side> {
        let side = Side::ALL
            .into_iter()
            .find(|side| self.slots[side.index()].is_none())?;
        self.slots[side.index()] = Some(connection_id);
        Some(side)
    }

    /// Free a side. Releasing a free side is a no-op.
    pub fn release(&mut self, side: Side) {
        self.slots[side.index()] = None;
    }

    /// Connection currently seated on a side
    pub fn holder(&self, side: Side) -> Option<ConnectionId> {
        self.slots[side.index()]
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// A live room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    id: RoomId,
    name: String,
    creator: String,
    max_users: usize,
    users: Vec<Participant>,
    slots: SlotAllocator,
    invite_code: String,
    invite_link: String,
    created_at: DateTime<Utc>,
}

impl Room {
    /// Create an empty room. `max_users` is clamped to the seat count.
    pub fn new(
        id: RoomId,
        name: String,
        creator: String,
        max_users: usize,
        invite_code: String,
        invite_link: String,
    ) -> Self {
        Self {
            id,
            name,
            creator,
            max_users: max_users.clamp(1, MAX_SLOTS),
            users: Vec::new(),
            slots: SlotAllocator::new(),
            invite_code,
            invite_link,
            created_at: current_timestamp(),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn max_users(&self) -> usize {
        self.max_users
    }

    /// Number of members; always equal to `users().len()`
    pub fn current_users(&self) -> usize {
        self.users.len()
    }

    pub fn users(&self) -> &[Participant] {
        &self.users
    }

    pub fn invite_code(&self) -> &str {
        &self.invite_code
    }

    pub fn invite_link(&self) -> &str {
        &self.invite_link
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_full(&self) -> bool {
        self.slots.occupied() >= self.max_users
    }

    /// Connection seated on a side, if any
    pub fn holder(&self, side: Side) -> Option<ConnectionId> {
        self.slots.holder(side)
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Connection ids of every member, in join order
    pub fn member_connections(&self) -> Vec<ConnectionId> {
        self.users.iter().map(|p| p.connection_id).collect()
    }

    /// Seat a new participant on the first free side
    pub fn add_participant(
        &mut self,
        connection_id: ConnectionId,
        user_id: UserId,
        name: String,
        session_epoch: u64,
    ) -> Result<Participant> {
        if self.is_full() {
            return Err(RelayError::RoomFull {
                room_id: self.id.to_string(),
            }
            .into());
        }

        if self.users.iter().any(|p| p.connection_id == connection_id) {
            return Err(RelayError::AlreadyJoined {
                connection_id: connection_id.to_string(),
            }
            .into());
        }

        let side = self
            .slots
            .acquire(connection_id)
            .ok_or_else(|| RelayError::RoomFull {
                room_id: self.id.to_string(),
            })?;

        let participant = Participant {
            connection_id,
            user_id,
            name,
            room_id: self.id,
            side,
            joined_at: current_timestamp(),
            session_epoch,
        };
        self.users.push(participant.clone());

        Ok(participant)
    }

    /// Remove a participant and free their side
    pub fn remove_participant(&mut self, connection_id: ConnectionId) -> Option<Participant> {
        let index = self
            .users
            .iter()
            .position(|p| p.connection_id == connection_id)?;
        let removed = self.users.remove(index);
        self.slots.release(removed.side);
        Some(removed)
    }

    /// Listing entry for this room
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            name: self.name.clone(),
            creator: self.creator.clone(),
            current_users: self.current_users(),
            max_users: self.max_users,
            invite_code: self.invite_code.clone(),
            invite_link: self.invite_link.clone(),
            created_at: self.created_at,
        }
    }

    /// Full view including members
    pub fn view(&self) -> RoomView {
        RoomView {
            summary: self.summary(),
            users: self.users.iter().map(Participant::info).collect::<Vec<ParticipantInfo>>(),
        }
    }
}
