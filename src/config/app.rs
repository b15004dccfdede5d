//! Main application configuration
//!
//! This module defines the primary configuration structures for the duet-room
//! relay, including environment variable loading, TOML files and validation.

use crate::error::RelayError;
use crate::room::instance::MAX_SLOTS;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub rooms: RoomSettings,
    pub avatar: AvatarSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Address the HTTP/WebSocket server binds to
    pub http_host: String,
    /// Port for the HTTP/WebSocket server
    pub http_port: u16,
    /// Base URL used when building invite links
    pub public_base_url: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Per-connection outbound event queue capacity
    pub outbound_queue_size: usize,
}

/// Room directory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    /// Capacity used when a create request omits `maxUsers`
    pub default_max_users: usize,
    /// Invite code regenerations allowed before giving up
    pub invite_code_max_attempts: u32,
}

/// Downstream avatar service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarSettings {
    /// Avatar generation endpoint; placeholder avatars are used when unset
    pub service_url: Option<String>,
    /// Timeout for a single avatar request in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "duet-room".to_string(),
            log_level: "info".to_string(),
            http_host: "0.0.0.0".to_string(),
            http_port: 8081,
            public_base_url: "http://localhost:8081".to_string(),
            shutdown_timeout_seconds: 30,
            outbound_queue_size: 256,
        }
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            default_max_users: MAX_SLOTS,
            invite_code_max_attempts: 16,
        }
    }
}

impl Default for AvatarSettings {
    fn default() -> Self {
        Self {
            service_url: None,
            request_timeout_ms: 10_000,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HTTP_HOST") {
            self.service.http_host = host;
        }
        if let Ok(port) = env::var("HTTP_PORT") {
            self.service.http_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HTTP_PORT value: {}", port))?;
        }
        if let Ok(url) = env::var("PUBLIC_BASE_URL") {
            self.service.public_base_url = url;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }
        if let Ok(size) = env::var("OUTBOUND_QUEUE_SIZE") {
            self.service.outbound_queue_size = size
                .parse()
                .map_err(|_| anyhow!("Invalid OUTBOUND_QUEUE_SIZE value: {}", size))?;
        }

        // Room settings
        if let Ok(max_users) = env::var("DEFAULT_MAX_USERS") {
            self.rooms.default_max_users = max_users
                .parse()
                .map_err(|_| anyhow!("Invalid DEFAULT_MAX_USERS value: {}", max_users))?;
        }
        if let Ok(attempts) = env::var("INVITE_CODE_MAX_ATTEMPTS") {
            self.rooms.invite_code_max_attempts = attempts
                .parse()
                .map_err(|_| anyhow!("Invalid INVITE_CODE_MAX_ATTEMPTS value: {}", attempts))?;
        }

        // Avatar settings
        if let Ok(url) = env::var("AVATAR_SERVICE_URL") {
            self.avatar.service_url = if url.is_empty() { None } else { Some(url) };
        }
        if let Ok(timeout) = env::var("AVATAR_REQUEST_TIMEOUT_MS") {
            self.avatar.request_timeout_ms = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid AVATAR_REQUEST_TIMEOUT_MS value: {}", timeout))?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get avatar request timeout as Duration
    pub fn avatar_timeout(&self) -> Duration {
        Duration::from_millis(self.avatar.request_timeout_ms)
    }

    /// Socket address string for the HTTP server
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.http_host, self.service.http_port)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => {
            return Err(invalid(format!(
                "Invalid log level: {}",
                config.service.log_level
            )))
        }
    }

    // Validate ports
    if config.service.http_port == 0 {
        return Err(invalid("HTTP port cannot be 0"));
    }
    if config.service.public_base_url.is_empty() {
        return Err(invalid("Public base URL cannot be empty"));
    }

    // Validate timeouts and sizes
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(invalid("Shutdown timeout must be greater than 0"));
    }
    if config.service.outbound_queue_size == 0 {
        return Err(invalid("Outbound queue size must be greater than 0"));
    }
    if config.avatar.request_timeout_ms == 0 {
        return Err(invalid("Avatar request timeout must be greater than 0"));
    }

    // Validate room settings
    if config.rooms.default_max_users == 0 || config.rooms.default_max_users > MAX_SLOTS {
        return Err(invalid(format!(
            "Default max users must be between 1 and {}",
            MAX_SLOTS
        )));
    }
    if config.rooms.invite_code_max_attempts == 0 {
        return Err(invalid("Invite code attempts must be greater than 0"));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    RelayError::Configuration {
        message: message.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.service.http_port, 8081);
        assert_eq!(config.rooms.default_max_users, 2);
        assert_eq!(config.http_addr(), "0.0.0.0:8081");
        assert_eq!(config.avatar_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.rooms.default_max_users = 3;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.rooms.invite_code_max_attempts = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(
            RelayError::from_anyhow(&err),
            Some(RelayError::Configuration { .. })
        ));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [service]
            http_port = 9000

            [avatar]
            service_url = "http://localhost:8082/api/try-on"
            "#,
        )
        .unwrap();

        assert_eq!(config.service.http_port, 9000);
        assert_eq!(config.service.name, "duet-room");
        assert_eq!(
            config.avatar.service_url.as_deref(),
            Some("http://localhost:8082/api/try-on")
        );
        assert_eq!(config.avatar.request_timeout_ms, 10_000);
        assert!(validate_config(&config).is_ok());
    }
}
