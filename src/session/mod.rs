//! Session lifecycle for realtime connections
//!
//! This module tracks which connection holds which seat, and drives the
//! join / leave / relay state machine on top of the room directory.

pub mod manager;
pub mod registry;
pub mod store;

// Re-export commonly used types
pub use manager::{ManagerConfig, SessionManager, SessionManagerStats, TryOnOutcome};
pub use registry::{ConnectionRegistry, ConnectionState};
pub use store::SessionStore;
