//! Room directory: rooms keyed by id and by invite code
//!
//! The directory is plain data. It is owned by the session store and only
//! mutated under the store's lock.

use crate::error::{RelayError, Result};
use crate::room::instance::{Room, MAX_SLOTS};
use crate::types::RoomId;
use crate::utils::{generate_invite_code, generate_room_id, invite_link};
use rand::Rng;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Directory settings
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Base URL used for invite links
    pub public_base_url: String,
    /// Invite code regenerations allowed on collision
    pub invite_code_max_attempts: u32,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8081".to_string(),
            invite_code_max_attempts: 16,
        }
    }
}

/// Registry of live rooms
#[derive(Debug, Default)]
pub struct RoomDirectory {
    config: DirectoryConfig,
    rooms: HashMap<RoomId, Room>,
    invite_codes: HashMap<String, RoomId>,
}

impl RoomDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            config,
            rooms: HashMap::new(),
            invite_codes: HashMap::new(),
        }
    }

    /// Create a room with a fresh id and unique invite code
    pub fn create(&mut self, name: &str, creator: &str, max_users: usize) -> Result<Room> {
        self.create_with_rng(name, creator, max_users, &mut rand::thread_rng())
    }

    /// Same as [`RoomDirectory::create`] with an explicit randomness source
    pub fn create_with_rng<R: Rng + ?Sized>(
        &mut self,
        name: &str,
        creator: &str,
        max_users: usize,
        rng: &mut R,
    ) -> Result<Room> {
        let name = name.trim();
        let creator = creator.trim();
        if name.is_empty() || creator.is_empty() {
            return Err(RelayError::Validation {
                reason: "roomName and creatorName are required".to_string(),
            }
            .into());
        }
        if max_users == 0 {
            return Err(RelayError::Validation {
                reason: "maxUsers must be at least 1".to_string(),
            }
            .into());
        }
        if max_users > MAX_SLOTS {
            debug!(
                "Requested maxUsers {} exceeds {} seats, clamping",
                max_users, MAX_SLOTS
            );
        }

        let invite_code = self.allocate_invite_code(rng)?;
        let id = generate_room_id();
        let link = invite_link(&self.config.public_base_url, &invite_code);
        let room = Room::new(
            id,
            name.to_string(),
            creator.to_string(),
            max_users,
            invite_code.clone(),
            link,
        );

        self.invite_codes.insert(invite_code, id);
        self.rooms.insert(id, room.clone());

        info!(
            "Created room {} '{}' by '{}' - invite: {}, max_users: {}",
            id,
            room.name(),
            room.creator(),
            room.invite_code(),
            room.max_users()
        );
        Ok(room)
    }

    fn allocate_invite_code<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<String> {
        let attempts = self.config.invite_code_max_attempts;
        for attempt in 1..=attempts {
            let code = generate_invite_code(rng);
            if !self.invite_codes.contains_key(&code) {
                return Ok(code);
            }
            warn!(
                "Invite code collision on attempt {}/{}, regenerating",
                attempt, attempts
            );
        }

        Err(RelayError::InviteCodeExhausted { attempts }.into())
    }

    pub fn lookup_by_id(&self, id: RoomId) -> Option<Room> {
        self.rooms.get(&id).cloned()
    }

    pub fn lookup_by_invite_code(&self, code: &str) -> Option<Room> {
        self.invite_codes
            .get(code)
            .and_then(|id| self.rooms.get(id))
            .cloned()
    }

    /// Resolve a client-supplied reference: room id first, then invite code
    pub fn resolve(&self, reference: &str) -> Option<RoomId> {
        let reference = reference.trim();
        if let Ok(id) = reference.parse::<RoomId>() {
            if self.rooms.contains_key(&id) {
                return Some(id);
            }
        }
        self.invite_codes.get(reference).copied()
    }

    pub(crate) fn get_mut(&mut self, id: RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(&id)
    }

    /// Point-in-time copy of every room, oldest first
    pub fn list(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.values().cloned().collect();
        rooms.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then(a.id().cmp(&b.id()))
        });
        rooms
    }

    /// Remove a room. Returns the removed record, `None` if already gone.
    pub fn delete(&mut self, id: RoomId) -> Option<Room> {
        let room = self.rooms.remove(&id)?;
        self.invite_codes.remove(room.invite_code());
        info!("Deleted room {} '{}'", id, room.name());
        Some(room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn create_test_directory() -> RoomDirectory {
        RoomDirectory::new(DirectoryConfig::default())
    }

    #[test]
    fn test_create_and_lookup() {
        let mut directory = create_test_directory();
        let room = directory.create("Demo", "Alice", 2).unwrap();

        assert_eq!(room.current_users(), 0);
        assert_eq!(room.invite_code().len(), 8);
        assert_eq!(
            room.invite_link(),
            format!("http://localhost:8081/invite/{}", room.invite_code())
        );
        assert_eq!(directory.lookup_by_id(room.id()), Some(room.clone()));
        assert_eq!(
            directory.lookup_by_invite_code(room.invite_code()),
            Some(room.clone())
        );
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_lookup_is_exact() {
        let mut directory = create_test_directory();
        let room = directory.create("Demo", "Alice", 2).unwrap();

        let lowered = room.invite_code().to_lowercase();
        if lowered != room.invite_code() {
            assert!(directory.lookup_by_invite_code(&lowered).is_none());
        }
        assert!(directory.lookup_by_invite_code(&room.invite_code()[..7]).is_none());
        assert!(directory.lookup_by_invite_code("INVALID123").is_none());
        assert!(directory.lookup_by_id(generate_room_id()).is_none());
    }

    #[test]
    fn test_validation() {
        let mut directory = create_test_directory();

        for (name, creator) in [("", "Alice"), ("Demo", ""), ("   ", "Alice")] {
            let err = directory.create(name, creator, 2).unwrap_err();
            assert!(matches!(
                RelayError::from_anyhow(&err),
                Some(RelayError::Validation { .. })
            ));
        }
        assert!(directory.create("Demo", "Alice", 0).is_err());
        assert!(directory.is_empty());
    }

    #[test]
    fn test_invite_code_collision_regenerates() {
        let mut directory = create_test_directory();
        let first = directory
            .create_with_rng("One", "Alice", 2, &mut StdRng::seed_from_u64(42))
            .unwrap();

        // Same seed: the first candidate collides and must be regenerated
        let second = directory
            .create_with_rng("Two", "Bob", 2, &mut StdRng::seed_from_u64(42))
            .unwrap();

        assert_ne!(first.invite_code(), second.invite_code());
        assert_eq!(
            directory.lookup_by_invite_code(first.invite_code()).unwrap().id(),
            first.id()
        );
        assert_eq!(
            directory.lookup_by_invite_code(second.invite_code()).unwrap().id(),
            second.id()
        );
    }

    #[test]
    fn test_invite_code_exhaustion() {
        let mut directory = RoomDirectory::new(DirectoryConfig {
            invite_code_max_attempts: 1,
            ..DirectoryConfig::default()
        });
        directory
            .create_with_rng("One", "Alice", 2, &mut StdRng::seed_from_u64(9))
            .unwrap();

        let err = directory
            .create_with_rng("Two", "Bob", 2, &mut StdRng::seed_from_u64(9))
            .unwrap_err();
        assert_eq!(
            RelayError::from_anyhow(&err),
            Some(&RelayError::InviteCodeExhausted { attempts: 1 })
        );
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_invite_codes_unique_across_many_rooms() {
        let mut directory = create_test_directory();
        for i in 0..500 {
            directory
                .create(&format!("Room {}", i), "Alice", 2)
                .unwrap();
        }
        let codes: HashSet<String> = directory
            .list()
            .iter()
            .map(|r| r.invite_code().to_string())
            .collect();
        assert_eq!(codes.len(), 500);
    }

    #[test]
    fn test_list_is_a_snapshot() {
        let mut directory = create_test_directory();
        let room = directory.create("Demo", "Alice", 2).unwrap();

        let snapshot = directory.list();
        directory
            .get_mut(room.id())
            .unwrap()
            .add_participant(
                crate::utils::generate_connection_id(),
                "u1".to_string(),
                "Alice".to_string(),
                1,
            )
            .unwrap();
        directory.create("Other", "Bob", 2).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].current_users(), 0);
        assert_eq!(directory.list().len(), 2);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut directory = create_test_directory();
        let room = directory.create("Demo", "Alice", 2).unwrap();

        assert!(directory.delete(room.id()).is_some());
        assert!(directory.delete(room.id()).is_none());
        assert!(directory.lookup_by_id(room.id()).is_none());
        assert!(directory.lookup_by_invite_code(room.invite_code()).is_none());
    }

    #[test]
    fn test_resolve_by_id_or_code() {
        let mut directory = create_test_directory();
        let room = directory.create("Demo", "Alice", 2).unwrap();

        assert_eq!(directory.resolve(&room.id().to_string()), Some(room.id()));
        assert_eq!(directory.resolve(room.invite_code()), Some(room.id()));
        assert_eq!(directory.resolve("nope"), None);
    }
}
