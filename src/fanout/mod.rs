//! Event fan-out engine
//!
//! Delivers server events to a single connection, the members of a room or
//! every live connection.

pub mod hub;
pub mod publisher;

pub use hub::{ClientConnection, ConnectionHub};
pub use publisher::{Delivery, EventPublisher, RecordingPublisher};
