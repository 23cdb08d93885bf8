//! CLI argument structs for all commands.
//!
//! This module contains the argument definitions for each CLI command.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::types::{LinkTypeArg, SeverityArg, StatusArg, TagKindArg, TierArg};
use super::validators::{
    validate_downtime, validate_incident_id, validate_prefix, validate_title, validate_url,
};
use crate::domain::IncidentId;

/// Arguments for the `init` command
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Incident key prefix (e.g., "INC" for "INC-2000")
    ///
    /// Must be 2-20 alphanumeric characters.
    #[arg(short, long, value_parser = validate_prefix)]
    pub prefix: Option<String>,

    /// First incident number (default 2000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub id_floor: Option<u64>,

    /// Suppress output messages
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the `create` command
#[derive(Parser, Debug, Clone)]
pub struct CreateArgs {
    /// Incident title
    #[arg(long, value_parser = validate_title)]
    pub title: String,

    /// Severity (P0 is the most severe)
    #[arg(short, long, value_enum)]
    pub severity: SeverityArg,

    /// Detailed description
    #[arg(short = 'D', long)]
    pub description: Option<String>,

    /// Tier of the affected service
    #[arg(short, long, value_enum)]
    pub tier: Option<TierArg>,

    /// Restrict visibility to involved users and superusers
    #[arg(long)]
    pub private: bool,

    /// Total downtime, e.g. "1h 30m"
    #[arg(long, value_parser = validate_downtime)]
    pub downtime: Option<String>,

    /// Captain email
    #[arg(long)]
    pub captain: Option<String>,

    /// Reporter email
    #[arg(long)]
    pub reporter: Option<String>,
}

/// Arguments for the `list` command
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Filter by status
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    /// Filter by severity
    #[arg(short, long, value_enum)]
    pub severity: Option<SeverityArg>,

    /// List as this user; private incidents they are not involved in are hidden
    #[arg(long = "as", value_name = "EMAIL")]
    pub as_user: Option<String>,

    /// Treat the `--as` user as a superuser
    #[arg(long, requires = "as_user")]
    pub superuser: bool,

    /// Maximum number of results
    #[arg(short, long, default_value = "50")]
    pub limit: usize,
}

/// Arguments for the `show` command
#[derive(Parser, Debug, Clone)]
pub struct ShowArgs {
    /// Incident number or key (e.g., 2000 or INC-2000)
    #[arg(value_parser = validate_incident_id)]
    pub id: IncidentId,
}

/// Arguments for the `update` command
#[derive(Parser, Debug, Clone)]
pub struct UpdateArgs {
    /// Incident number or key
    #[arg(value_parser = validate_incident_id)]
    pub id: IncidentId,

    /// New title
    #[arg(long, value_parser = validate_title)]
    pub title: Option<String>,

    /// New description
    #[arg(short = 'D', long)]
    pub description: Option<String>,

    /// New status
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    /// New severity
    #[arg(short, long, value_enum)]
    pub severity: Option<SeverityArg>,

    /// New service tier
    #[arg(short, long, value_enum)]
    pub tier: Option<TierArg>,

    /// Make the incident private (true) or public (false)
    #[arg(long)]
    pub private: Option<bool>,

    /// New downtime, e.g. "45m"
    #[arg(long, value_parser = validate_downtime, conflicts_with = "clear_downtime")]
    pub downtime: Option<String>,

    /// Clear the recorded downtime
    #[arg(long)]
    pub clear_downtime: bool,

    /// New captain email
    #[arg(long)]
    pub captain: Option<String>,

    /// Add a tag as KIND=NAME (kinds: service, root-cause, impact)
    #[arg(long = "tag", value_name = "KIND=NAME", value_parser = parse_tag_arg)]
    pub tags: Vec<(TagKindArg, String)>,
}

/// Arguments for the `link` command
#[derive(Parser, Debug, Clone)]
pub struct LinkArgs {
    /// Incident number or key
    #[arg(value_parser = validate_incident_id)]
    pub id: IncidentId,

    /// Link type
    #[arg(short, long, value_enum)]
    pub kind: LinkTypeArg,

    /// URL to store
    #[arg(long, value_parser = validate_url, required_unless_present = "remove")]
    pub url: Option<String>,

    /// Remove the link instead of setting it
    #[arg(long, conflicts_with = "url")]
    pub remove: bool,
}

/// Arguments for the `sync` command
#[derive(Parser, Debug, Clone)]
pub struct SyncArgs {
    /// Incident numbers or keys
    #[arg(required = true, value_parser = validate_incident_id)]
    pub ids: Vec<IncidentId>,

    /// Directory snapshot file (YAML) describing users and channels
    #[arg(short, long, value_name = "FILE")]
    pub directory: PathBuf,

    /// Ignore the throttle window
    #[arg(short, long)]
    pub force: bool,

    /// Also write the incident summary to the channel topic
    #[arg(long)]
    pub publish_topic: bool,
}

/// Arguments for the `duration` command
#[derive(Parser, Debug, Clone)]
pub struct DurationArgs {
    /// Duration action
    #[command(subcommand)]
    pub action: DurationAction,
}

/// Duration conversions
#[derive(Subcommand, Debug, Clone)]
pub enum DurationAction {
    /// Parse text like "1h 30m" into seconds
    Parse {
        /// Duration text
        text: String,
    },

    /// Format seconds as text like "1h 30m"
    Format {
        /// Total seconds
        seconds: u64,
    },
}

fn parse_tag_arg(s: &str) -> Result<(TagKindArg, String), String> {
    use clap::ValueEnum;

    let (kind, name) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid tag '{s}'. Expected KIND=NAME"))?;
    let kind = TagKindArg::from_str(kind.trim(), true)?;
    let name = name.trim();
    if name.is_empty() {
        return Err("Tag name cannot be empty".to_string());
    }
    Ok((kind, name.to_string()))
}
