//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the duet-room relay using
//! Prometheus metrics on a private registry.

use crate::session::manager::SessionManagerStats;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the relay
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Room directory metrics
    room_metrics: RoomMetrics,

    /// Realtime connection metrics
    connection_metrics: ConnectionMetrics,

    /// Relayed event metrics
    event_metrics: EventMetrics,

    /// Avatar service metrics
    avatar_metrics: AvatarMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Room directory metrics
#[derive(Clone)]
pub struct RoomMetrics {
    /// Rooms currently in the directory
    pub active_rooms: IntGauge,

    /// Participants currently seated in rooms
    pub active_participants: IntGauge,

    /// Total rooms created
    pub rooms_created_total: IntCounter,

    /// Total rooms removed after their last member left
    pub rooms_deleted_total: IntCounter,

    /// Join attempts by result
    pub join_attempts_total: IntCounterVec,
}

/// Realtime connection metrics
#[derive(Clone)]
pub struct ConnectionMetrics {
    /// Open realtime connections
    pub connections_active: IntGauge,

    /// Total realtime connections accepted
    pub connections_total: IntCounter,

    /// Events dropped because a connection queue was full or closed
    pub deliveries_dropped_total: IntCounter,
}

/// Relayed event metrics
#[derive(Clone)]
pub struct EventMetrics {
    /// Events published by name and delivery scope
    pub events_published_total: IntCounterVec,

    /// Time spent processing one inbound event
    pub event_processing_duration: HistogramVec,
}

/// Avatar service metrics
#[derive(Clone)]
pub struct AvatarMetrics {
    /// Try-on requests by outcome
    pub try_on_total: IntCounterVec,

    /// Avatar service round trip time
    pub try_on_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let room_metrics = RoomMetrics::new(&registry)?;
        let connection_metrics = ConnectionMetrics::new(&registry)?;
        let event_metrics = EventMetrics::new(&registry)?;
        let avatar_metrics = AvatarMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            room_metrics,
            connection_metrics,
            event_metrics,
            avatar_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn room(&self) -> &RoomMetrics {
        &self.room_metrics
    }

    pub fn connection(&self) -> &ConnectionMetrics {
        &self.connection_metrics
    }

    pub fn event(&self) -> &EventMetrics {
        &self.event_metrics
    }

    pub fn avatar(&self) -> &AvatarMetrics {
        &self.avatar_metrics
    }

    /// Refresh gauges from session manager stats
    pub fn update_from_session_stats(&self, stats: &SessionManagerStats) {
        self.room_metrics
            .active_rooms
            .set(stats.active_rooms as i64);
        self.room_metrics
            .active_participants
            .set(stats.active_participants as i64);
        self.connection_metrics
            .connections_active
            .set(stats.connected_clients as i64);
    }

    pub fn record_room_created(&self) {
        self.room_metrics.rooms_created_total.inc();
        self.room_metrics.active_rooms.inc();
    }

    pub fn record_room_deleted(&self) {
        self.room_metrics.rooms_deleted_total.inc();
        self.room_metrics.active_rooms.dec();
    }

    /// Record a join attempt; `result` is `joined`, `not_found`, `full` or `rejected`
    pub fn record_join(&self, result: &str) {
        self.room_metrics
            .join_attempts_total
            .with_label_values(&[result])
            .inc();
        if result == "joined" {
            self.room_metrics.active_participants.inc();
        }
    }

    pub fn record_leave(&self) {
        self.room_metrics.active_participants.dec();
    }

    pub fn record_connection_opened(&self) {
        self.connection_metrics.connections_total.inc();
        self.connection_metrics.connections_active.inc();
    }

    pub fn record_connection_closed(&self) {
        self.connection_metrics.connections_active.dec();
    }

    pub fn record_dropped_delivery(&self) {
        self.connection_metrics.deliveries_dropped_total.inc();
    }

    /// Record an event handed to the fan-out engine
    pub fn record_event_published(&self, event: &str, scope: &str) {
        self.event_metrics
            .events_published_total
            .with_label_values(&[event, scope])
            .inc();
    }

    /// Record how long an inbound event took to process
    pub fn record_event_processing(&self, operation: &str, duration: Duration) {
        self.event_metrics
            .event_processing_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Record a try-on outcome; `status` is `success`, `error`, `timeout` or `discarded`
    pub fn record_try_on(&self, status: &str, duration: Duration) {
        self.avatar_metrics
            .try_on_total
            .with_label_values(&[status])
            .inc();
        self.avatar_metrics
            .try_on_duration
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("duet_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "duet_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("duet_room_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl RoomMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_rooms = IntGauge::new("duet_room_active_rooms", "Number of live rooms")?;
        registry.register(Box::new(active_rooms.clone()))?;

        let active_participants = IntGauge::new(
            "duet_room_active_participants",
            "Participants currently seated in rooms",
        )?;
        registry.register(Box::new(active_participants.clone()))?;

        let rooms_created_total =
            IntCounter::new("duet_room_rooms_created_total", "Total rooms created")?;
        registry.register(Box::new(rooms_created_total.clone()))?;

        let rooms_deleted_total = IntCounter::new(
            "duet_room_rooms_deleted_total",
            "Total rooms removed when emptied",
        )?;
        registry.register(Box::new(rooms_deleted_total.clone()))?;

        let join_attempts_total = IntCounterVec::new(
            Opts::new("duet_room_join_attempts_total", "Join attempts by result"),
            &["result"],
        )?;
        registry.register(Box::new(join_attempts_total.clone()))?;

        Ok(Self {
            active_rooms,
            active_participants,
            rooms_created_total,
            rooms_deleted_total,
            join_attempts_total,
        })
    }
}

impl ConnectionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let connections_active = IntGauge::new(
            "duet_room_connections_active",
            "Open realtime connections",
        )?;
        registry.register(Box::new(connections_active.clone()))?;

        let connections_total = IntCounter::new(
            "duet_room_connections_total",
            "Total realtime connections accepted",
        )?;
        registry.register(Box::new(connections_total.clone()))?;

        let deliveries_dropped_total = IntCounter::new(
            "duet_room_deliveries_dropped_total",
            "Events dropped because a connection queue was full or closed",
        )?;
        registry.register(Box::new(deliveries_dropped_total.clone()))?;

        Ok(Self {
            connections_active,
            connections_total,
            deliveries_dropped_total,
        })
    }
}

impl EventMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let events_published_total = IntCounterVec::new(
            Opts::new(
                "duet_room_events_published_total",
                "Events published by name and scope",
            ),
            &["event", "scope"],
        )?;
        registry.register(Box::new(events_published_total.clone()))?;

        let event_processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "duet_room_event_processing_duration_seconds",
                "Inbound event processing time",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
            &["operation"],
        )?;
        registry.register(Box::new(event_processing_duration.clone()))?;

        Ok(Self {
            events_published_total,
            event_processing_duration,
        })
    }
}

impl AvatarMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let try_on_total = IntCounterVec::new(
            Opts::new("duet_room_try_on_total", "Try-on requests by outcome"),
            &["status"],
        )?;
        registry.register(Box::new(try_on_total.clone()))?;

        let try_on_duration = Histogram::with_opts(
            HistogramOpts::new(
                "duet_room_try_on_duration_seconds",
                "Avatar service round trip time",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(try_on_duration.clone()))?;

        Ok(Self {
            try_on_total,
            try_on_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
