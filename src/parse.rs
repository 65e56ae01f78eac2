//! Parsing utilities for human-readable configuration values

use std::time::Duration;

/// Parse duration string (e.g., "30s", "5m", "1h", "100ms")
///
/// Returns Duration. Defaults to 30 seconds if parsing fails.
///
/// # Supported formats
/// - `"1h"` - hours
/// - `"5m"` - minutes
/// - `"30s"` or `"30"` - seconds
/// - `"100ms"` - milliseconds
pub fn parse_duration(s: &str) -> Duration {
    let s = s.trim().to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60 * 1000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60 * 1000)
    } else {
        (s.as_str(), 1000)
    };

    num_str
        .trim()
        .parse::<u64>()
        .map(|n| Duration::from_millis(n.saturating_mul(multiplier)))
        .unwrap_or(Duration::from_secs(30))
}

/// Parse a comma-separated list of histogram bucket boundaries
/// (e.g., "0.01,0.05,0.1,0.5,1,2,5").
///
/// Returns `None` unless every entry is a finite number and the list is
/// non-empty and strictly ascending.
pub fn parse_buckets(s: &str) -> Option<Vec<f64>> {
    let buckets = s
        .split(',')
        .map(|part| part.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect::<Option<Vec<f64>>>()?;

    let ascending = buckets.windows(2).all(|w| w[0] < w[1]);
    (!buckets.is_empty() && ascending).then_some(buckets)
}

/// Parse a boolean flag ("true"/"false", "1"/"0", "yes"/"no").
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
