//! Duet Room - realtime relay for two-seat rooms
//!
//! This crate provides the room directory, the per-connection session
//! lifecycle and the event fan-out engine behind an axum HTTP/WebSocket
//! facade.

pub mod avatar;
pub mod config;
pub mod error;
pub mod fanout;
pub mod http;
pub mod metrics;
pub mod room;
pub mod service;
pub mod session;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{RelayError, Result};
pub use types::*;

// Re-export key components
pub use fanout::{Delivery, EventPublisher, RecordingPublisher};
pub use room::RoomDirectory;
pub use session::{ManagerConfig, SessionManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
