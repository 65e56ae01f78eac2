//! Core metric types: Counter, Histogram, Gauge
//!
//! Thread-safe per-series value cells plus the plain data types the
//! registry hands out in snapshots.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of a registered metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Monotonically increasing value (e.g., total requests, errors).
    Counter,
    /// Value that can go up and down (e.g., active connections).
    Gauge,
    /// Distribution of observations in cumulative buckets.
    Histogram,
}

impl MetricKind {
    /// Name used on the `# TYPE` line of the exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered label values identifying one series of a metric.
///
/// Values line up positionally with the metric's declared label names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LabelValues(Vec<String>);

impl LabelValues {
    /// Build from borrowed values.
    pub fn new(values: &[&str]) -> Self {
        Self(values.iter().map(|v| v.to_string()).collect())
    }

    /// The values in declaration order.
    pub fn values(&self) -> &[String] {
        &self.0
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the tuple is empty (unlabeled metric).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pair the values with their label names.
    pub fn pairs<'a>(&'a self, names: &'a [String]) -> impl Iterator<Item = (&'a str, &'a str)> {
        names
            .iter()
            .map(String::as_str)
            .zip(self.0.iter().map(String::as_str))
    }
}

impl From<Vec<String>> for LabelValues {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

/// `f64` stored in an `AtomicU64` by bit pattern.
///
/// Additions use a compare-exchange loop so concurrent updates are never lost.
#[derive(Debug, Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    /// Create a cell holding `value`.
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    /// Current value.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Overwrite the value.
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    /// Add `delta` (may be negative) and return the previous value.
    pub fn add(&self, delta: f64) -> f64 {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(prev) => return f64::from_bits(prev),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Per-series histogram state.
///
/// Guarded by a single mutex so a reader always sees bucket counts, sum and
/// count from the same instant.
#[derive(Debug)]
pub struct HistogramCell {
    state: Mutex<HistogramState>,
}

#[derive(Debug, Clone)]
struct HistogramState {
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl HistogramCell {
    /// Create an empty cell for `bucket_count` finite boundaries.
    pub fn new(bucket_count: usize) -> Self {
        Self {
            state: Mutex::new(HistogramState {
                counts: vec![0; bucket_count],
                sum: 0.0,
                count: 0,
            }),
        }
    }

    /// Record one observation against the given boundaries.
    pub fn observe(&self, bounds: &[f64], value: f64) {
        let mut state = self.state.lock();
        // Cumulative: every bucket whose bound is >= value
        for (slot, &bound) in state.counts.iter_mut().zip(bounds) {
            if value <= bound {
                *slot += 1;
            }
        }
        state.sum += value;
        state.count += 1;
    }

    /// Copy the current state out for export.
    pub fn data(&self, bounds: &[f64]) -> HistogramData {
        let state = self.state.lock();
        HistogramData {
            buckets: bounds.to_vec(),
            counts: state.counts.clone(),
            sum: state.sum,
            count: state.count,
        }
    }
}

/// Histogram data for a single label combination.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramData {
    /// Finite bucket boundaries, ascending
    pub buckets: Vec<f64>,
    /// Cumulative counts for each finite bucket
    pub counts: Vec<u64>,
    /// Sum of all observed values
    pub sum: f64,
    /// Total number of observations (the `+Inf` bucket)
    pub count: u64,
}

impl HistogramData {
    /// Count of the bucket with boundary `le`, if that boundary exists.
    pub fn bucket(&self, le: f64) -> Option<u64> {
        self.buckets
            .iter()
            .position(|&b| b == le)
            .map(|i| self.counts[i])
    }
}

/// Point-in-time value of one series.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    /// Counter total
    Counter(f64),
    /// Gauge reading
    Gauge(f64),
    /// Histogram buckets, sum and count
    Histogram(HistogramData),
}

/// Buckets for HTTP request durations (in seconds).
pub const HTTP_DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0];
