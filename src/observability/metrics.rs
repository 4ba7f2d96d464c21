//! Metrics collection and exposition.
//!
//! # Metrics
//! - `breaker_calls_total` (counter): calls by breaker, outcome
//! - `breaker_call_duration_seconds` (histogram): latency of executed calls
//! - `breaker_transitions_total` (counter): transitions by breaker, target state
//! - `breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//!
//! # Design Decisions
//! - Labels are breaker name plus one small enum; no unbounded cardinality
//! - Rejected calls are counted but never timed

use std::net::SocketAddr;
use std::time::Duration;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::BreakerState;

/// How a call through a breaker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    Timeout,
    Rejected,
}

impl CallOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Failure => "failure",
            CallOutcome::Timeout => "timeout",
            CallOutcome::Rejected => "rejected",
        }
    }
}

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call(breaker: &str, outcome: CallOutcome, elapsed: Option<Duration>) {
    counter!(
        "breaker_calls_total",
        "breaker" => breaker.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    if let Some(elapsed) = elapsed {
        histogram!("breaker_call_duration_seconds", "breaker" => breaker.to_string())
            .record(elapsed.as_secs_f64());
    }
}

pub fn record_transition(breaker: &str, to: BreakerState) {
    let target = match to {
        BreakerState::Closed => "closed",
        BreakerState::Open => "open",
        BreakerState::HalfOpen => "half_open",
    };
    counter!(
        "breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => target
    )
    .increment(1);

    record_state(breaker, to);
}

pub fn record_state(breaker: &str, state: BreakerState) {
    gauge!("breaker_state", "breaker" => breaker.to_string()).set(state.gauge_value());
}
