//! Configuration management for the duet-room service
//!
//! This module handles all configuration loading from environment variables
//! and TOML files, validation, and default values for the relay.

pub mod app;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, AvatarSettings, RoomSettings, ServiceSettings};
