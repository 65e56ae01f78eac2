//! Prometheus text format export
//!
//! Converts MetricRegistry data to Prometheus exposition format.

use super::registry::{MetricRegistry, MetricSnapshot};
use super::types::{HistogramData, LabelValues, SampleValue};
use std::fmt::Write;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Export metrics in Prometheus text format.
///
/// Metrics appear in registration order and series in the order they were
/// first created. Reading never mutates the registry.
///
/// # Example Output
///
/// ```text
/// # HELP myapp_http_requests_total Total HTTP requests received
/// # TYPE myapp_http_requests_total counter
/// myapp_http_requests_total{method="GET",endpoint="/api",status="200"} 42
/// # HELP myapp_request_duration_seconds HTTP request duration in seconds
/// # TYPE myapp_request_duration_seconds histogram
/// myapp_request_duration_seconds_bucket{method="GET",endpoint="/api",le="0.1"} 10
/// myapp_request_duration_seconds_bucket{method="GET",endpoint="/api",le="0.5"} 35
/// myapp_request_duration_seconds_bucket{method="GET",endpoint="/api",le="+Inf"} 42
/// myapp_request_duration_seconds_sum{method="GET",endpoint="/api"} 12.345
/// myapp_request_duration_seconds_count{method="GET",endpoint="/api"} 42
/// ```
pub fn export_prometheus(registry: &MetricRegistry) -> String {
    render(&registry.snapshot())
}

/// Render an already-taken snapshot.
pub fn render(snapshot: &[MetricSnapshot]) -> String {
    let mut output = String::with_capacity(4096);

    for family in snapshot {
        let metric = &family.metric;
        let name = metric.name();
        let names = metric.label_names();

        // Writing to a String cannot fail
        let _ = writeln!(output, "# HELP {name} {}", escape_help(metric.help()));
        let _ = writeln!(output, "# TYPE {name} {}", metric.kind());

        for (labels, value) in &family.series {
            match value {
                SampleValue::Counter(v) | SampleValue::Gauge(v) => {
                    write_sample(&mut output, name, "", &format_labels(names, labels, None), *v);
                }
                SampleValue::Histogram(data) => {
                    write_histogram(&mut output, name, names, labels, data);
                }
            }
        }
    }

    output
}

fn write_histogram(
    output: &mut String,
    name: &str,
    names: &[String],
    labels: &LabelValues,
    data: &HistogramData,
) {
    // Bucket lines
    for (&bound, &count) in data.buckets.iter().zip(&data.counts) {
        let le = format_value(bound);
        let label_str = format_labels(names, labels, Some(&le));
        let _ = writeln!(output, "{name}_bucket{label_str} {count}");
    }

    // +Inf bucket (total count)
    let label_str = format_labels(names, labels, Some("+Inf"));
    let _ = writeln!(output, "{name}_bucket{label_str} {}", data.count);

    let label_str = format_labels(names, labels, None);
    write_sample(output, name, "_sum", &label_str, data.sum);
    let _ = writeln!(output, "{name}_count{label_str} {}", data.count);
}

fn write_sample(output: &mut String, name: &str, suffix: &str, label_str: &str, value: f64) {
    let _ = writeln!(output, "{name}{suffix}{label_str} {}", format_value(value));
}

/// Render `{k="v",...}`, or nothing for an empty label set.
fn format_labels(names: &[String], labels: &LabelValues, le: Option<&str>) -> String {
    let mut pairs: Vec<String> = labels
        .pairs(names)
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label(v)))
        .collect();
    if let Some(le) = le {
        pairs.push(format!("le=\"{le}\""));
    }

    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs.join(","))
    }
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a sample value or bucket boundary for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else if value == value.floor() && value.abs() < 1e15 {
        // Integer-like values
        format!("{:.0}", value)
    } else {
        // Shortest round-trip representation
        format!("{}", value)
    }
}

/// Extension trait for MetricRegistry to add prometheus export.
pub trait PrometheusExport {
    /// Export all metrics in Prometheus text format.
    fn export_prometheus(&self) -> String;
}

impl PrometheusExport for MetricRegistry {
    fn export_prometheus(&self) -> String {
        export_prometheus(self)
    }
}
