//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the session
//! manager, the connection hub, the HTTP server and background tasks.

use crate::avatar::generator_from_settings;
use crate::config::AppConfig;
use crate::error::RelayError;
use crate::fanout::{ConnectionHub, EventPublisher};
use crate::http::{HttpServer, HttpServerConfig, HttpState};
use crate::metrics::MetricsCollector;
use crate::session::{ManagerConfig, SessionManager};
use axum::Router;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Interval between stats -> gauge refreshes
const STATS_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Interval between uptime/health gauge refreshes
const HEALTH_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("HTTP server error: {message}")]
    Http { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Room and session lifecycle
    manager: SessionManager,

    /// Live connection queues, also the manager's publisher
    hub: Arc<ConnectionHub>,

    /// Prometheus metrics
    metrics: Arc<MetricsCollector>,

    /// HTTP + WebSocket server
    http_server: Arc<HttpServer>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing duet-room relay");
        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: match RelayError::from_anyhow(&e) {
                Some(RelayError::Configuration { message }) => message.clone(),
                _ => e.to_string(),
            },
        })?;

        let metrics =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let hub = Arc::new(ConnectionHub::new(metrics.clone()));
        let avatar =
            generator_from_settings(&config.avatar).map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create avatar generator: {}", e),
            })?;

        let publisher: Arc<dyn EventPublisher> = hub.clone();
        let manager = SessionManager::with_components(
            ManagerConfig::from_app_config(&config),
            publisher,
            avatar,
            metrics.clone(),
        );

        let is_running = Arc::new(RwLock::new(false));
        let http_state = HttpState {
            manager: manager.clone(),
            hub: hub.clone(),
            metrics: metrics.clone(),
            service_name: config.service.name.clone(),
            outbound_queue_size: config.service.outbound_queue_size,
            is_running: is_running.clone(),
        };
        let http_server = Arc::new(HttpServer::new(
            HttpServerConfig {
                host: config.service.http_host.clone(),
                port: config.service.http_port,
            },
            http_state,
        ));

        Ok(Self {
            config,
            manager,
            hub,
            metrics,
            http_server,
            background_tasks: Vec::new(),
            is_running,
        })
    }

    /// Start the HTTP server and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting duet-room relay");

        *self.is_running.write().await = true;

        self.start_http_server().await?;
        self.start_background_tasks();

        info!("✅ duet-room relay started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of duet-room relay");

        *self.is_running.write().await = false;

        if let Err(e) = self.http_server.stop().await {
            warn!("Failed to stop HTTP server: {}", e);
        } else {
            info!("✅ HTTP server stop requested");
        }

        self.stop_background_tasks().await;

        let final_stats = self.manager.get_stats().await;
        info!("Final service statistics: {:?}", final_stats);
        info!("✅ duet-room relay shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn manager(&self) -> SessionManager {
        self.manager.clone()
    }

    pub fn hub(&self) -> Arc<ConnectionHub> {
        self.hub.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Router serving the same routes as the live server
    pub fn router(&self) -> Router {
        self.http_server.router()
    }

    async fn start_http_server(&mut self) -> Result<(), ServiceError> {
        let server = self.http_server.clone();
        let addr = self.config.http_addr();

        let handle = tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("HTTP server failed: {:#}", e);
            } else {
                info!("HTTP server task completed");
            }
        });

        // Give the listener a moment to bind, and surface an immediate failure
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if handle.is_finished() {
            return Err(ServiceError::Http {
                message: format!("HTTP server on {} exited during startup", addr),
            });
        }

        self.background_tasks.push(handle);
        info!("✅ HTTP server started on {}", addr);
        Ok(())
    }

    /// Start background maintenance tasks
    fn start_background_tasks(&mut self) {
        info!("Starting background maintenance tasks...");

        let stats_task = {
            let manager = self.manager.clone();
            let metrics = self.metrics.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(STATS_REFRESH_INTERVAL);
                info!("Stats refresh task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let stats = manager.get_stats().await;
                    debug!(
                        "Updating metrics - rooms: {}, participants: {}, connections: {}",
                        stats.active_rooms, stats.active_participants, stats.connected_clients
                    );
                    metrics.update_from_session_stats(&stats);
                }

                info!("Stats refresh task stopped");
            })
        };

        let health_metrics_task = {
            let metrics = self.metrics.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEALTH_REFRESH_INTERVAL);
                let start_time = tokio::time::Instant::now();
                info!("Health metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let uptime_seconds = start_time.elapsed().as_secs() as i64;
                    metrics.service().uptime_seconds.set(uptime_seconds);
                    metrics.update_component_health("session_manager", true);
                    metrics.update_component_health("http", true);

                    debug!("Updated service health metrics - uptime: {}s", uptime_seconds);
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(stats_task);
        self.background_tasks.push(health_metrics_task);

        info!("{} background tasks running", self.background_tasks.len());
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
