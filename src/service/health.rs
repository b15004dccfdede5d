//! Health reporting
//!
//! This module provides the health check used by the `/health` endpoint and
//! the `--health-check` command line probe.

use crate::fanout::ConnectionHub;
use crate::session::SessionManager;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Upper bound on waiting for the session store during a health check
const STORE_CHECK_TIMEOUT: Duration = Duration::from_secs(1);

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Numeric value exported as the health gauge
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Unhealthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Healthy => 2,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Crate version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub active_rooms: usize,
    pub active_participants: usize,
    pub connected_clients: usize,
    /// Live outbound queues held by the fan-out hub
    pub open_queues: usize,
    pub rooms_created: u64,
    pub messages_relayed: u64,
}

impl HealthCheck {
    /// Perform a full health check of the relay
    pub async fn check(
        manager: &SessionManager,
        hub: &ConnectionHub,
        service_name: &str,
        running: bool,
    ) -> Result<Self> {
        let mut checks = Vec::new();

        checks.push(Self::check_service_running(running));
        checks.push(Self::check_session_store(manager).await);

        let overall_status = checks
            .iter()
            .map(|check| check.status.clone())
            .fold(HealthStatus::Healthy, worst);

        let session_stats = manager.get_stats().await;
        let stats = ServiceStats {
            active_rooms: session_stats.active_rooms,
            active_participants: session_stats.active_participants,
            connected_clients: session_stats.connected_clients,
            open_queues: hub.connection_count().await,
            rooms_created: session_stats.rooms_created,
            messages_relayed: session_stats.messages_relayed,
        };

        Ok(HealthCheck {
            status: overall_status,
            service: service_name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check
    pub fn liveness_check(running: bool) -> HealthStatus {
        if running {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    fn check_service_running(running: bool) -> ComponentCheck {
        let (status, message) = if running {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: 0,
        }
    }

    /// The store lock must be obtainable and the directory consistent
    async fn check_session_store(manager: &SessionManager) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) =
            match tokio::time::timeout(STORE_CHECK_TIMEOUT, manager.verify_invariants()).await {
                Ok(Ok(())) => (HealthStatus::Healthy, None),
                Ok(Err(e)) => {
                    error!("Session store consistency check failed: {}", e);
                    (HealthStatus::Degraded, Some(e.to_string()))
                }
                Err(_) => (
                    HealthStatus::Unhealthy,
                    Some("Session store lock timed out".to_string()),
                ),
            };
        debug!("Session store check completed: {}", status);

        ComponentCheck {
            name: "session_store".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

fn worst(a: HealthStatus, b: HealthStatus) -> HealthStatus {
    if a.as_gauge() <= b.as_gauge() {
        a
    } else {
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::RecordingPublisher;
    use crate::metrics::MetricsCollector;
    use crate::session::ManagerConfig;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health_check_reports_counts() {
        let manager =
            SessionManager::new(ManagerConfig::default(), Arc::new(RecordingPublisher::new()));
        let hub = ConnectionHub::new(Arc::new(MetricsCollector::new().unwrap()));
        manager
            .create_room(crate::types::CreateRoomRequest {
                room_name: Some("Demo".to_string()),
                creator_name: Some("Alice".to_string()),
                max_users: None,
            })
            .await
            .unwrap();

        let health = HealthCheck::check(&manager, &hub, "duet-room", true)
            .await
            .unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.stats.active_rooms, 1);
        assert_eq!(health.checks.len(), 2);
        assert!(health.to_json().unwrap().contains("\"healthy\""));

        let health = HealthCheck::check(&manager, &hub, "duet-room", false)
            .await
            .unwrap();
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_liveness_and_gauge() {
        assert_eq!(HealthCheck::liveness_check(true), HealthStatus::Healthy);
        assert_eq!(HealthCheck::liveness_check(false), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::Degraded.as_gauge(), 1);
        assert_eq!(
            worst(HealthStatus::Healthy, HealthStatus::Degraded),
            HealthStatus::Degraded
        );
    }
}
