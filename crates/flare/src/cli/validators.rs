//! CLI input validation functions.
//!
//! These validators are used by clap's `value_parser` attribute to validate
//! user input at parse time, providing immediate feedback for invalid values.

use crate::domain::{IncidentId, MAX_TITLE_LENGTH};
use crate::duration;

/// Validate incident key prefix format.
///
/// Delegates to [`crate::config::validate_prefix`].
pub fn validate_prefix(s: &str) -> Result<String, String> {
    let trimmed = s.trim();
    crate::config::validate_prefix(trimmed).map_err(|e| e.to_string())?;
    Ok(trimmed.to_string())
}

/// Validate an incident reference: a bare number (`2000`) or a key
/// (`INC-2000`).
pub fn validate_incident_id(s: &str) -> Result<IncidentId, String> {
    IncidentId::parse_key(s).ok_or_else(|| {
        format!("Invalid incident ID '{}'. Expected a number or a key like INC-2000", s.trim())
    })
}

/// Validate title length.
pub fn validate_title(s: &str) -> Result<String, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Title cannot be empty".to_string());
    }

    let length = s.chars().count();
    if length > MAX_TITLE_LENGTH {
        return Err(format!(
            "Title cannot exceed {MAX_TITLE_LENGTH} characters, got {length} characters"
        ));
    }

    if s.contains('\n') || s.contains('\r') {
        return Err("Title cannot contain newline characters".to_string());
    }

    Ok(s.to_string())
}

/// Validate a downtime string such as `1h 30m`, returning it unchanged.
pub fn validate_downtime(s: &str) -> Result<String, String> {
    duration::parse(s).map_err(|e| e.to_string())?;
    Ok(s.trim().to_string())
}

/// Validate a URL argument is non-empty.
pub fn validate_url(s: &str) -> Result<String, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("URL cannot be empty".to_string());
    }
    Ok(s.to_string())
}
