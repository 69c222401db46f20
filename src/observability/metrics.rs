//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pilot_config_events_total` (counter): config events by kind and event type
//! - `pilot_discovery_requests_total` (counter): discovery requests by route and cache outcome
//! - `pilot_discovery_cache_entries` (gauge): cached discovery responses
//! - `pilot_services` (gauge): services known to the registry

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint on `addr`. Must be called inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_config_event(kind: &str, event: &'static str) {
    metrics::counter!("pilot_config_events_total", "kind" => kind.to_string(), "event" => event)
        .increment(1);
}

pub fn record_discovery_request(route: &'static str, cached: bool) {
    let cache = if cached { "hit" } else { "miss" };
    metrics::counter!("pilot_discovery_requests_total", "route" => route, "cache" => cache)
        .increment(1);
}

pub fn record_cache_entries(entries: usize) {
    metrics::gauge!("pilot_discovery_cache_entries").set(entries as f64);
}

pub fn record_services(services: usize) {
    metrics::gauge!("pilot_services").set(services as f64);
}
