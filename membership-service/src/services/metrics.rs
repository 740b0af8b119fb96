//! Prometheus metrics for membership-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

use super::error::ErrorKind;
use crate::models::TokenKind;

/// Tokens issued, by kind.
pub static TOKENS_ISSUED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "membership_tokens_issued_total",
        "Total number of tokens issued",
        &["kind"]
    )
    .expect("Failed to register tokens_issued_total")
});

/// Invite redemption attempts, by outcome.
pub static INVITE_REDEMPTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "membership_invite_redemptions_total",
        "Total number of invite redemption attempts",
        &["outcome"]
    )
    .expect("Failed to register invite_redemptions_total")
});

/// Rejected credentials and tokens, by reason.
pub static AUTH_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "membership_auth_failures_total",
        "Total number of rejected credentials or tokens",
        &["reason"]
    )
    .expect("Failed to register auth_failures_total")
});

/// Core operation latency.
pub static OPERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "membership_operation_duration_seconds",
        "Core operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register operation_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&TOKENS_ISSUED_TOTAL);
    Lazy::force(&INVITE_REDEMPTIONS_TOTAL);
    Lazy::force(&AUTH_FAILURES_TOTAL);
    Lazy::force(&OPERATION_DURATION);
}

pub fn record_token_issued(kind: TokenKind) {
    TOKENS_ISSUED_TOTAL.with_label_values(&[kind.as_str()]).inc();
}

/// `outcome` is `ok` or an error kind label.
pub fn record_redemption(outcome: &str) {
    INVITE_REDEMPTIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_auth_failure(kind: ErrorKind) {
    AUTH_FAILURES_TOTAL.with_label_values(&[kind.as_str()]).inc();
}

pub fn observe_operation(operation: &str, seconds: f64) {
    OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(seconds);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
