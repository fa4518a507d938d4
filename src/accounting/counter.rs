//! Per-path "bytes logged" counters, kept in a Prometheus registry.
//!
//! The event loop is the only writer; the metrics endpoint gathers and encodes
//! concurrently. Series are created on first reference and never reset or
//! decremented.

use std::fmt;

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

use crate::core::errors::{LfwError, Result};

/// Metric name exported for the bytes-logged family.
pub const BYTES_LOGGED_METRIC: &str = "fluentd_input_status_total_bytes_logged";
/// Help text exported for the bytes-logged family.
pub const BYTES_LOGGED_HELP: &str = "total bytes logged to disk (log file)";
/// Label distinguishing series within the family.
pub const PATH_LABEL: &str = "path";

/// Destination for counter deltas, keyed by label value.
pub trait CounterSink {
    /// Add `delta` to the series for `label`, creating it if needed.
    fn add(&self, label: &str, delta: u64);
}

/// A family of monotonically increasing counters labeled by path, registered
/// in its own registry.
pub struct BytesLoggedCounters {
    registry: Registry,
    family: IntCounterVec,
}

impl fmt::Debug for BytesLoggedCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BytesLoggedCounters")
            .field("series", &self.len())
            .finish_non_exhaustive()
    }
}

impl BytesLoggedCounters {
    pub fn new() -> Result<Self> {
        Self::with_name(BYTES_LOGGED_METRIC, BYTES_LOGGED_HELP)
    }

    /// Family under a custom name; fails if `name` is not a valid metric name.
    pub fn with_name(name: &str, help: &str) -> Result<Self> {
        let family = IntCounterVec::new(Opts::new(name, help), &[PATH_LABEL])?;
        let registry = Registry::new();
        registry.register(Box::new(family.clone()))?;
        Ok(Self { registry, family })
    }

    /// Get-or-create the series for `label`.
    pub fn counter(&self, label: &str) -> Result<IntCounter> {
        Ok(self.family.get_metric_with_label_values(&[label])?)
    }

    /// Current value of a series, if it exists.
    #[must_use]
    pub fn value(&self, label: &str) -> Option<u64> {
        self.snapshot()
            .into_iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, value)| value)
    }

    /// Number of series in the family.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum over every series.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.snapshot()
            .into_iter()
            .map(|(_, value)| value)
            .fold(0, u64::saturating_add)
    }

    /// Label/value pairs sorted by label.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let families = self.registry.gather();
        let mut series: Vec<(String, u64)> = families
            .iter()
            .flat_map(|family| family.get_metric())
            .filter_map(|metric| {
                let label = metric
                    .get_label()
                    .iter()
                    .find(|pair| pair.get_name() == PATH_LABEL)?;
                Some((
                    label.get_value().to_string(),
                    whole(metric.get_counter().get_value()),
                ))
            })
            .collect();
        series.sort();
        series
    }

    /// Encode the family in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| LfwError::Metrics {
            details: err.to_string(),
        })
    }

    /// Content type matching [`render`](Self::render).
    #[must_use]
    pub fn content_type() -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl CounterSink for BytesLoggedCounters {
    fn add(&self, label: &str, delta: u64) {
        match self.family.get_metric_with_label_values(&[label]) {
            Ok(counter) => counter.inc_by(delta),
            Err(err) => warn!(path = label, error = %err, "bytes-logged series unavailable"),
        }
    }
}

impl<T: CounterSink + ?Sized> CounterSink for std::sync::Arc<T> {
    fn add(&self, label: &str, delta: u64) {
        (**self).add(label, delta);
    }
}

// Gathered samples are floats; integer counters stay exact below 2^53.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(value: f64) -> u64 {
    value as u64
}
