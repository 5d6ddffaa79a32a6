//! Timestamp parsing and `MM:SS` formatting.
//!
//! Upstream output mixes `HH:MM:SS`, `MM:SS`, bare seconds and fractional
//! seconds. Suggestions are always stored as `MM:SS`, where minutes may
//! exceed 59 for long sources.

use thiserror::Error;

/// Maximum reasonable source duration (24 hours in seconds).
pub const MAX_SOURCE_DURATION_SECS: f64 = 86400.0;

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, MM:SS, or seconds")]
    InvalidFormat(String),

    #[error("Timestamp exceeds maximum allowed duration ({0} hours)")]
    ExceedsMaxDuration(f64),
}

fn component(value: &str, name: &'static str) -> Result<f64, TimestampError> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|_| TimestampError::InvalidValue(name, value.to_string()))?;
    if !parsed.is_finite() {
        return Err(TimestampError::InvalidValue(name, value.to_string()));
    }
    if parsed < 0.0 {
        return Err(TimestampError::Negative);
    }
    Ok(parsed)
}

/// Parse a timestamp string to total seconds.
///
/// Supports `HH:MM:SS(.mmm)`, `MM:SS(.mmm)` and `SS(.mmm)`.
///
/// # Examples
/// ```
/// use clipgen_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let total = match parts.as_slice() {
        [secs] => component(secs, "seconds")?,
        [mins, secs] => component(mins, "minutes")? * 60.0 + component(secs, "seconds")?,
        [hours, mins, secs] => {
            component(hours, "hours")? * 3600.0
                + component(mins, "minutes")? * 60.0
                + component(secs, "seconds")?
        }
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    if total > MAX_SOURCE_DURATION_SECS {
        return Err(TimestampError::ExceedsMaxDuration(MAX_SOURCE_DURATION_SECS / 3600.0));
    }
    Ok(total)
}

/// Format seconds as `MM:SS`, truncating fractional seconds.
pub fn to_mm_ss(total_secs: f64) -> String {
    let whole = total_secs.max(0.0).floor() as u64;
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

/// Normalize any supported timestamp to `MM:SS`.
///
/// # Examples
/// ```
/// use clipgen_models::timestamp::normalize_mm_ss;
/// assert_eq!(normalize_mm_ss("5:3").unwrap(), "05:03");
/// assert_eq!(normalize_mm_ss("95").unwrap(), "01:35");
/// assert_eq!(normalize_mm_ss("01:02:03").unwrap(), "62:03");
/// ```
pub fn normalize_mm_ss(ts: &str) -> Result<String, TimestampError> {
    parse_timestamp(ts).map(to_mm_ss)
}
