//! Prometheus metrics for the notification dispatch service.
//!
//! - Job metrics (enqueued, completed, failed, retried by channel)
//! - Active job gauge per channel
//! - Delivery attempt latency

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "herald";

lazy_static! {
    /// Total jobs accepted into a channel queue
    pub static ref JOBS_ENQUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_jobs_enqueued_total", METRIC_PREFIX),
        "Total jobs accepted into a channel queue",
        &["channel"]
    ).unwrap();

    /// Total jobs that reached the completed state
    pub static ref JOBS_COMPLETED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_jobs_completed_total", METRIC_PREFIX),
        "Total jobs that completed successfully",
        &["channel"]
    ).unwrap();

    /// Total jobs that reached the terminal failed state
    pub static ref JOBS_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_jobs_failed_total", METRIC_PREFIX),
        "Total jobs that failed terminally",
        &["channel"]
    ).unwrap();

    /// Total delivery attempts rescheduled for retry
    pub static ref JOBS_RETRIED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_jobs_retried_total", METRIC_PREFIX),
        "Total delivery attempts rescheduled with backoff",
        &["channel"]
    ).unwrap();

    /// Jobs currently held active by a worker
    pub static ref JOBS_ACTIVE: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_jobs_active", METRIC_PREFIX),
        "Jobs currently held active by a worker",
        &["channel"]
    ).unwrap();

    /// Delivery attempt duration (adapter call including timeout)
    pub static ref ATTEMPT_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        format!("{}_attempt_duration_seconds", METRIC_PREFIX),
        "Delivery attempt duration in seconds",
        &["channel"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0]
    ).unwrap();
}

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Helpers for job lifecycle metrics, keyed by channel label.
pub struct JobMetrics;

impl JobMetrics {
    pub fn record_enqueued(channel: &str) {
        JOBS_ENQUEUED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_completed(channel: &str) {
        JOBS_COMPLETED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_failed(channel: &str) {
        JOBS_FAILED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn record_retried(channel: &str) {
        JOBS_RETRIED_TOTAL.with_label_values(&[channel]).inc();
    }

    pub fn job_activated(channel: &str) {
        JOBS_ACTIVE.with_label_values(&[channel]).inc();
    }

    pub fn job_released(channel: &str) {
        JOBS_ACTIVE.with_label_values(&[channel]).dec();
    }

    pub fn observe_attempt_duration(channel: &str, seconds: f64) {
        ATTEMPT_DURATION_SECONDS
            .with_label_values(&[channel])
            .observe(seconds);
    }
}
