//! Prometheus metrics for monitoring the fleet server.
//!
//! Metrics are exposed in Prometheus text format on a separate listener
//! (`METRICS_BIND`). Without an installed exporter every call is a no-op.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts and duration by route and status
//! - **Fleet Metrics**: Fleets created, bots requested, spawn outcomes, live bots
//! - **Control Metrics**: Operator directives by action and result

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio::sync::watch;

/// Initialize Prometheus metrics exporter.
///
/// Sets up a Prometheus scrape endpoint on the specified address.
/// Metrics will be available at `http://<addr>/metrics`.
///
/// # Arguments
///
/// - `addr`: Address to bind the metrics server to (e.g., `0.0.0.0:9090`)
///
/// # Returns
///
/// Result indicating success or error message
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
///
/// Increments the total HTTP request counter with method, path, and status labels.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Fleet Metrics
// ============================================================================

/// Increment fleets created counter and add the requested bots.
pub fn fleet_requested(bot_count: u32) {
    metrics::counter!("fleets_created_total").increment(1);
    metrics::counter!("bots_requested_total").increment(u64::from(bot_count));
}

/// Record the outcome of a finished batch.
pub fn fleet_spawned(connected: u32, failed: u32) {
    metrics::counter!("bot_spawns_total", "result" => "connected").increment(u64::from(connected));
    metrics::counter!("bot_spawns_total", "result" => "failed").increment(u64::from(failed));
}

/// Set current live bots count.
pub fn live_bots(count: usize) {
    metrics::gauge!("live_bots").set(count as f64);
}

/// Mirror the fleet's live count into the `live_bots` gauge.
///
/// Runs until the fleet's registry is dropped. Spawn it next to the server.
pub async fn track_live_bots(mut live: watch::Receiver<usize>) {
    loop {
        live_bots(*live.borrow_and_update());
        if live.changed().await.is_err() {
            break;
        }
    }
}

// ============================================================================
// Control Metrics
// ============================================================================

/// Add `count` operator directives with one outcome.
pub fn control_commands_total(action: &str, applied: bool, count: u64) {
    if count == 0 {
        return;
    }
    metrics::counter!("control_commands_total",
        "action" => action.to_string(),
        "result" => if applied { "applied" } else { "rejected" }
    )
    .increment(count);
}
