//! Error types for the room relay
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application. Specific failures are `RelayError` values so the
//! edges (HTTP handlers, the realtime event path) can map them to responses.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific relay scenarios
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid request: {reason}")]
    Validation { reason: String },

    #[error("Room not found: {room_id}")]
    RoomNotFound { room_id: String },

    #[error("Invite code not found: {code}")]
    InviteCodeNotFound { code: String },

    #[error("Room is full: {room_id}")]
    RoomFull { room_id: String },

    #[error("Connection {connection_id} is already in a room")]
    AlreadyJoined { connection_id: String },

    #[error("Connection {connection_id} is not in a room")]
    NotInRoom { connection_id: String },

    #[error("Could not allocate a unique invite code after {attempts} attempts")]
    InviteCodeExhausted { attempts: u32 },

    #[error("Avatar service error: {message}")]
    Downstream { message: String },

    #[error("Avatar service did not answer within {timeout_ms}ms")]
    DownstreamTimeout { timeout_ms: u64 },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal service error: {message}")]
    Internal { message: String },
}

impl RelayError {
    /// Recover a `RelayError` from an `anyhow::Error`, if that is what it wraps
    pub fn from_anyhow(error: &anyhow::Error) -> Option<&RelayError> {
        error.downcast_ref::<RelayError>()
    }

    /// Whether the error means the addressed room or invite code does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RelayError::RoomNotFound { .. } | RelayError::InviteCodeNotFound { .. }
        )
    }
}
