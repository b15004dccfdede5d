//! Room management for the relay
//!
//! This module holds the room record with its seat allocator and the
//! directory that indexes live rooms by id and invite code.

pub mod directory;
pub mod instance;

// Re-export commonly used types
pub use directory::{DirectoryConfig, RoomDirectory};
pub use instance::{Room, SlotAllocator, MAX_SLOTS};
