//! Output formatting for CLI commands.
//!
//! Commands print either human-readable text or JSON. Text output is
//! colorized unless `NO_COLOR` is set or `FLARE_COLOR` is `0`/`false`.

use crate::domain::{Incident, IncidentStatus, Severity, UserId};
use crate::duration;
use crate::sync::SyncResult;
use colored::Colorize;
use serde::Serialize;
use std::collections::HashMap;
use std::env;
use std::io::{self, Write};

/// Output format mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

/// Settings for text output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    /// Whether to use colors in output.
    pub use_colors: bool,
}

impl OutputConfig {
    /// Read color preference from `NO_COLOR` and `FLARE_COLOR`.
    pub fn from_env() -> Self {
        let use_colors = env::var("NO_COLOR").is_err()
            && env::var("FLARE_COLOR")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true);
        Self { use_colors }
    }

    /// Plain output, used by tests.
    pub fn plain() -> Self {
        Self { use_colors: false }
    }
}

/// Display names for user ids referenced by incidents.
pub type UserNames = HashMap<UserId, String>;

/// JSON shape of an incident: the stored record plus its key and formatted
/// downtime.
#[derive(Debug, Serialize)]
pub struct IncidentView<'a> {
    /// External key, e.g. `INC-2000`
    pub key: String,

    /// Downtime in human form, e.g. `1h 30m`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downtime: Option<String>,

    #[serde(flatten)]
    incident: &'a Incident,
}

impl<'a> IncidentView<'a> {
    /// View of an incident under the given key prefix.
    pub fn new(incident: &'a Incident, prefix: &str) -> Self {
        Self {
            key: incident.key(prefix),
            downtime: duration::format_optional(incident.downtime_seconds),
            incident,
        }
    }
}

// ============================================================================
// Color Helpers
// ============================================================================

/// Apply color to status text based on incident status.
pub(crate) fn colorize_status(status: IncidentStatus, config: &OutputConfig) -> String {
    let text = status.to_string();
    if !config.use_colors {
        return text;
    }
    match status {
        IncidentStatus::Active => text.red().bold().to_string(),
        IncidentStatus::Mitigated => text.yellow().to_string(),
        IncidentStatus::Postmortem => text.cyan().to_string(),
        IncidentStatus::Done => text.green().to_string(),
        IncidentStatus::Cancelled => text.dimmed().to_string(),
    }
}

/// Apply color to severity text.
pub(crate) fn colorize_severity(severity: Severity, config: &OutputConfig) -> String {
    let text = severity.to_string();
    if !config.use_colors {
        return text;
    }
    match severity {
        Severity::P0 => text.red().bold().to_string(),
        Severity::P1 => text.red().to_string(),
        Severity::P2 => text.yellow().to_string(),
        Severity::P3 | Severity::P4 => text,
    }
}

fn colorize_key(key: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return key.to_string();
    }
    key.cyan().to_string()
}

fn dimmed(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.dimmed().to_string()
}

fn user_label(id: UserId, names: &UserNames) -> String {
    names
        .get(&id)
        .cloned()
        .unwrap_or_else(|| format!("user {id}"))
}

// ============================================================================
// Public Dispatch Functions
// ============================================================================

/// Print an incident with full details (for the show command).
pub fn print_incident(
    incident: &Incident,
    prefix: &str,
    names: &UserNames,
    mode: OutputMode,
) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match mode {
        OutputMode::Text => {
            write_incident_details(&mut handle, incident, prefix, names, &OutputConfig::from_env())
        }
        OutputMode::Json => write_json(&mut handle, &IncidentView::new(incident, prefix)),
    }
}

/// Print a list of incidents.
pub fn print_incidents(incidents: &[Incident], prefix: &str, mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match mode {
        OutputMode::Text => {
            write_incident_list(&mut handle, incidents, prefix, &OutputConfig::from_env())
        }
        OutputMode::Json => {
            let views: Vec<_> = incidents
                .iter()
                .map(|incident| IncidentView::new(incident, prefix))
                .collect();
            write_json(&mut handle, &views)
        }
    }
}

/// Print the outcome of one reconciliation.
pub fn print_sync_result(key: &str, result: &SyncResult, mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match mode {
        OutputMode::Text => write_sync_result(&mut handle, key, result, &OutputConfig::from_env()),
        OutputMode::Json => write_json(
            &mut handle,
            &serde_json::json!({ "incident": key, "result": result }),
        ),
    }
}

/// Print a simple message
pub fn print_message(msg: &str) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", msg)
}

/// Print a JSON-formatted result for any serializable value
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_json(&mut handle, value)
}

fn write_json<W: Write, T: Serialize + ?Sized>(w: &mut W, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(w, "{}", json)
}

// ============================================================================
// Text Formatting
// ============================================================================

fn write_incident_list<W: Write>(
    w: &mut W,
    incidents: &[Incident],
    prefix: &str,
    config: &OutputConfig,
) -> io::Result<()> {
    if incidents.is_empty() {
        writeln!(w, "No incidents found.")?;
        return Ok(());
    }

    writeln!(w, "Found {} incident(s):", incidents.len())?;
    writeln!(w)?;

    for incident in incidents {
        let private = if incident.is_private {
            format!(" {}", dimmed("[private]", config))
        } else {
            String::new()
        };
        writeln!(
            w,
            "{}  {}  {}  {}{}",
            colorize_key(&incident.key(prefix), config),
            colorize_severity(incident.severity, config),
            colorize_status(incident.status, config),
            incident.title,
            private
        )?;
    }

    Ok(())
}

fn write_incident_details<W: Write>(
    w: &mut W,
    incident: &Incident,
    prefix: &str,
    names: &UserNames,
    config: &OutputConfig,
) -> io::Result<()> {
    writeln!(
        w,
        "{} {}",
        colorize_key(&incident.key(prefix), config),
        incident.title
    )?;
    writeln!(
        w,
        "  {} {}   {} {}",
        dimmed("Status:", config),
        colorize_status(incident.status, config),
        dimmed("Severity:", config),
        colorize_severity(incident.severity, config)
    )?;

    if let Some(tier) = incident.service_tier {
        writeln!(w, "  {} {}", dimmed("Tier:", config), tier)?;
    }
    if incident.is_private {
        writeln!(w, "  {} yes", dimmed("Private:", config))?;
    }
    if let Some(captain) = incident.captain {
        writeln!(w, "  {} {}", dimmed("Captain:", config), user_label(captain, names))?;
    }
    if let Some(reporter) = incident.reporter {
        writeln!(w, "  {} {}", dimmed("Reporter:", config), user_label(reporter, names))?;
    }
    if let Some(downtime) = duration::format_optional(incident.downtime_seconds) {
        writeln!(w, "  {} {}", dimmed("Downtime:", config), downtime)?;
    }

    writeln!(
        w,
        "  {} {}",
        dimmed("Created:", config),
        incident.created_at.format("%Y-%m-%d %H:%M UTC")
    )?;
    if let Some(mitigated) = incident.mitigated_at {
        writeln!(
            w,
            "  {} {}",
            dimmed("Mitigated:", config),
            mitigated.format("%Y-%m-%d %H:%M UTC")
        )?;
    }
    if let Some(closed) = incident.closed_at {
        writeln!(
            w,
            "  {} {}",
            dimmed("Closed:", config),
            closed.format("%Y-%m-%d %H:%M UTC")
        )?;
    }

    if !incident.description.is_empty() {
        writeln!(w)?;
        writeln!(w, "{}", incident.description)?;
    }

    if !incident.participants.is_empty() {
        writeln!(w)?;
        writeln!(w, "Participants ({}):", incident.participants.len())?;
        for participant in &incident.participants {
            writeln!(w, "  - {}", user_label(*participant, names))?;
        }
    }

    if !incident.external_links.is_empty() {
        writeln!(w)?;
        writeln!(w, "Links:")?;
        for (link_type, url) in &incident.external_links {
            writeln!(w, "  {} {}", dimmed(&format!("{link_type}:"), config), url)?;
        }
    }

    Ok(())
}

fn write_sync_result<W: Write>(
    w: &mut W,
    key: &str,
    result: &SyncResult,
    config: &OutputConfig,
) -> io::Result<()> {
    let key = colorize_key(key, config);
    if result.skipped {
        writeln!(w, "{key}: synced recently, skipped (use --force to override)")?;
        return Ok(());
    }

    writeln!(
        w,
        "{key}: {} added, {} already present",
        result.added, result.already_existed
    )?;
    for error in &result.errors {
        let label = if config.use_colors {
            "error:".red().to_string()
        } else {
            "error:".to_string()
        };
        writeln!(w, "  {label} {error}")?;
    }
    Ok(())
}
