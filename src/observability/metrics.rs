//! Metrics collection and exposition.
//!
//! # Metrics
//! - `redirect_requests_total` (counter): resolved requests by outcome
//!   (`canonical`, `matched`, `not_found`, `pass_through`)
//! - `redirect_rule_hits_total` (counter): rule matches, labelled by action
//! - `redirect_log_entries_total` (counter): audit entries written, by kind
//! - `redirect_log_failures_total` (counter): audit writes that failed

use metrics::Unit;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

fn describe() {
    metrics::describe_counter!(
        "redirect_requests_total",
        Unit::Count,
        "Requests resolved by the redirect pipeline, labelled by outcome."
    );
    metrics::describe_counter!(
        "redirect_rule_hits_total",
        Unit::Count,
        "Rule matches, labelled by action kind."
    );
    metrics::describe_counter!(
        "redirect_log_entries_total",
        Unit::Count,
        "Audit log entries written, labelled by kind."
    );
    metrics::describe_counter!(
        "redirect_log_failures_total",
        Unit::Count,
        "Audit log writes that failed."
    );
}

pub fn record_request(outcome: &'static str) {
    metrics::counter!("redirect_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_rule_hit(action: &'static str) {
    metrics::counter!("redirect_rule_hits_total", "action" => action).increment(1);
}

pub fn record_log_entry(kind: &'static str) {
    metrics::counter!("redirect_log_entries_total", "kind" => kind).increment(1);
}

pub fn record_log_failure() {
    metrics::counter!("redirect_log_failures_total").increment(1);
}
