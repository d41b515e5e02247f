//! Metrics module for payments-service.
//! Provides Prometheus metrics for reconciliation and checkout operations.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "payments_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Payment syncs counter by resulting status
pub static PAYMENTS_SYNCED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Entitlement grants counter by plan
pub static ENTITLEMENTS_GRANTED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Webhook deliveries counter by outcome
pub static WEBHOOK_EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Checkout preferences counter by plan
pub static CHECKOUTS_CREATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    PAYMENTS_SYNCED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "payments_synced_total",
                "Total payment reconciliations by resulting status"
            ),
            &["status"]
        )
        .expect("Failed to register PAYMENTS_SYNCED_TOTAL")
    });

    ENTITLEMENTS_GRANTED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "payments_entitlements_granted_total",
                "Total first-time entitlement grants by plan"
            ),
            &["plan_id"]
        )
        .expect("Failed to register ENTITLEMENTS_GRANTED_TOTAL")
    });

    WEBHOOK_EVENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "payments_webhook_events_total",
                "Total gateway notifications by outcome"
            ),
            &["outcome"]
        )
        .expect("Failed to register WEBHOOK_EVENTS_TOTAL")
    });

    CHECKOUTS_CREATED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "payments_checkouts_created_total",
                "Total checkout preferences created by plan"
            ),
            &["plan_id"]
        )
        .expect("Failed to register CHECKOUTS_CREATED_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("payments_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record a completed payment sync.
pub fn record_payment_synced(status: &str) {
    if let Some(counter) = PAYMENTS_SYNCED_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}

/// Record a first-time entitlement grant.
pub fn record_entitlement_granted(plan_id: &str) {
    if let Some(counter) = ENTITLEMENTS_GRANTED_TOTAL.get() {
        counter.with_label_values(&[plan_id]).inc();
    }
}

/// Record a webhook delivery outcome.
pub fn record_webhook_event(outcome: &str) {
    if let Some(counter) = WEBHOOK_EVENTS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record a checkout preference creation.
pub fn record_checkout_created(plan_id: &str) {
    if let Some(counter) = CHECKOUTS_CREATED_TOTAL.get() {
        counter.with_label_values(&[plan_id]).inc();
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
