//! Metrics for the duet-room relay
//!
//! Prometheus counters and gauges for rooms, connections, relayed events and
//! the avatar service, exposed by the HTTP facade at `/metrics`.

pub mod collector;

pub use collector::{
    AvatarMetrics, ConnectionMetrics, EventMetrics, MetricsCollector, MetricsTimer, RoomMetrics,
    ServiceMetrics,
};

use anyhow::Result;
use prometheus::TextEncoder;

/// Render a collector's registry in the Prometheus text format
pub fn render(collector: &MetricsCollector) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = collector.registry().gather();
    Ok(encoder.encode_to_string(&metric_families)?)
}
