//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rewrite_rules` (gauge): rules in the committed rewrite engine
//! - `rewrite_mutations_total` (counter): add/remove calls by outcome
//! - `rewrite_match_requests_total` (counter): lookups by matched/unmatched
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - The Prometheus exporter is optional and configured at startup

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_rewrite_rules(count: usize) {
    metrics::gauge!("rewrite_rules").set(count as f64);
}

pub fn record_rewrite_mutation(op: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("rewrite_mutations_total", "op" => op, "outcome" => outcome).increment(1);
}

pub fn record_match_request(matched: bool) {
    let matched = if matched { "true" } else { "false" };
    metrics::counter!("rewrite_match_requests_total", "matched" => matched).increment(1);
}
