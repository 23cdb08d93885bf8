//! Downtime duration codec.
//!
//! Converts between the compact human form used in incident reports
//! (`"1h 30m 45s"`) and whole seconds.
//!
//! # Grammar
//!
//! Up to three components `<n>h`, `<n>m`, `<n>s`, in that order, each at most
//! once. Units are case-insensitive and whitespace between and inside
//! components is ignored, so `"1H30m"` and `" 1 h 30 m "` are both accepted.
//!
//! [`format`] is canonical: it emits exactly one string per value, so
//! `parse(&format(n)) == Ok(n)` for every `n`.
//!
//! # Example
//!
//! ```
//! use flare::duration::{format, parse};
//!
//! assert_eq!(parse("1h 30m 45s").unwrap(), 5445);
//! assert_eq!(format(5445), "1h 30m 45s");
//! assert_eq!(format(0), "0s");
//! ```

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3600;

/// Whole-input shape: one or more `<digits><unit>` components.
static SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:\d+\s*[hms]\s*)+$").expect("constant regex pattern is valid")
});

/// A single component.
static COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*([hms])").expect("constant regex pattern is valid"));

/// Errors from [`parse`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DurationError {
    /// Input was empty or whitespace-only.
    #[error("duration is empty")]
    Empty,

    /// Input is not a sequence of `<n>h`, `<n>m`, `<n>s` components.
    #[error("invalid duration format: '{0}' (expected e.g. \"1h 30m 45s\")")]
    InvalidFormat(String),

    /// The same unit appeared more than once.
    #[error("duplicate unit '{0}' in duration")]
    DuplicateUnit(char),
}

/// Parse a human duration string into total seconds.
///
/// # Errors
///
/// - [`DurationError::Empty`] for empty or whitespace-only input
/// - [`DurationError::DuplicateUnit`] if a unit repeats, e.g. `"1h2h"`
/// - [`DurationError::InvalidFormat`] for anything else that does not match,
///   including out-of-order units and values too large to represent
pub fn parse(input: &str) -> Result<u64, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }

    if !SHAPE.is_match(trimmed) {
        return Err(DurationError::InvalidFormat(trimmed.to_string()));
    }

    // (unit, value) in input order
    let mut components: Vec<(char, u64)> = Vec::with_capacity(3);
    for caps in COMPONENT.captures_iter(trimmed) {
        let unit = caps[2]
            .chars()
            .next()
            .map(|c| c.to_ascii_lowercase())
            .ok_or_else(|| DurationError::InvalidFormat(trimmed.to_string()))?;

        if components.iter().any(|(seen, _)| *seen == unit) {
            return Err(DurationError::DuplicateUnit(unit));
        }

        let value: u64 = caps[1]
            .parse()
            .map_err(|_| DurationError::InvalidFormat(trimmed.to_string()))?;
        components.push((unit, value));
    }

    let ranks: Vec<u8> = components.iter().map(|(unit, _)| unit_rank(*unit)).collect();
    if ranks.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(DurationError::InvalidFormat(trimmed.to_string()));
    }

    components
        .iter()
        .try_fold(0u64, |total, &(unit, value)| {
            value
                .checked_mul(unit_seconds(unit))
                .and_then(|secs| total.checked_add(secs))
        })
        .ok_or_else(|| DurationError::InvalidFormat(trimmed.to_string()))
}

/// Format total seconds as the canonical component string.
///
/// Zero-valued components are omitted; zero itself formats as `"0s"`.
pub fn format(total_seconds: u64) -> String {
    let hours = total_seconds / SECONDS_PER_HOUR;
    let minutes = (total_seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let seconds = total_seconds % SECONDS_PER_MINUTE;

    let parts: Vec<String> = [(hours, 'h'), (minutes, 'm'), (seconds, 's')]
        .into_iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect();

    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}

/// Format an optional duration; absent stays absent.
pub fn format_optional(total_seconds: Option<u64>) -> Option<String> {
    total_seconds.map(format)
}

fn unit_rank(unit: char) -> u8 {
    match unit {
        'h' => 0,
        'm' => 1,
        _ => 2,
    }
}

fn unit_seconds(unit: char) -> u64 {
    match unit {
        'h' => SECONDS_PER_HOUR,
        'm' => SECONDS_PER_MINUTE,
        _ => 1,
    }
}
