//! Metrics sink for the reader loop

use std::fmt::Display;

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};
use tracing::error;

static UNEXPECTED_EXCEPTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "schema_registry_unexpected_exceptions_total",
        "Unexpected errors caught and survived by background loops",
        &["location"]
    )
    .expect("metric can be registered")
});

/// Sink for errors the reader survives instead of propagating
pub trait StatsSink: Send + Sync {
    fn unexpected_exception(&self, location: &str, error: &dyn Display);
}

/// Default sink: a Prometheus counter plus an error log line
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusStatsSink;

impl StatsSink for PrometheusStatsSink {
    fn unexpected_exception(&self, location: &str, error: &dyn Display) {
        UNEXPECTED_EXCEPTIONS.with_label_values(&[location]).inc();
        error!(location, error = %error, "unexpected exception");
    }
}
