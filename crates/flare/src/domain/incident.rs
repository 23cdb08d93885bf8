use super::tag::{TagId, TagKind};
use super::user::UserId;
use crate::duration;
use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of an incident title.
pub const MAX_TITLE_LENGTH: usize = 255;

/// Numeric incident identifier, assigned exactly once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(u64);

impl IncidentId {
    /// Wrap a raw identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw numeric value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// External key in the form `{prefix}-{id}`, e.g. `INC-2000`.
    pub fn key(self, prefix: &str) -> String {
        format!("{prefix}-{}", self.0)
    }

    /// Parse either a bare number or a `{prefix}-{id}` key.
    ///
    /// The prefix must be ASCII alphanumeric; it is not compared against
    /// the configured one.
    pub fn parse_key(s: &str) -> Option<Self> {
        let s = s.trim();
        let digits = match s.split_once('-') {
            Some((prefix, digits)) => {
                if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return None;
                }
                digits
            }
            None => s,
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self)
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when parsing a domain enum from text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {kind} '{value}' (expected one of: {expected})")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Canonical text form.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let needle = s.trim();
                $(
                    if needle.eq_ignore_ascii_case($text) {
                        return Ok($name::$variant);
                    }
                )+
                Err(ParseEnumError {
                    kind: $kind,
                    value: needle.to_string(),
                    expected: concat!($($text, " "),+),
                })
            }
        }
    };
}

/// Lifecycle status of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Incident is ongoing
    Active,

    /// Impact has stopped, root cause may remain
    Mitigated,

    /// Postmortem in progress
    Postmortem,

    /// Incident fully closed
    Done,

    /// Incident was declared in error
    Cancelled,
}

text_enum!(IncidentStatus, "status", {
    Active => "active",
    Mitigated => "mitigated",
    Postmortem => "postmortem",
    Done => "done",
    Cancelled => "cancelled",
});

impl IncidentStatus {
    /// Whether this status ends the incident.
    pub fn is_closed(self) -> bool {
        matches!(self, IncidentStatus::Done | IncidentStatus::Cancelled)
    }
}

/// Incident severity (P0 = most severe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Critical
    P0,
    /// High
    P1,
    /// Medium
    P2,
    /// Low
    P3,
    /// Informational
    P4,
}

text_enum!(Severity, "severity", {
    P0 => "P0",
    P1 => "P1",
    P2 => "P2",
    P3 => "P3",
    P4 => "P4",
});

/// Criticality tier of the affected service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServiceTier {
    /// Business critical
    T0,
    /// Tier 1
    T1,
    /// Tier 2
    T2,
    /// Tier 3
    T3,
    /// Tier 4
    T4,
}

text_enum!(ServiceTier, "service tier", {
    T0 => "T0",
    T1 => "T1",
    T2 => "T2",
    T3 => "T3",
    T4 => "T4",
});

/// Kind of external link attached to an incident. One URL per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Incident chat channel
    SlackChannel,
    /// Tracking ticket
    JiraTicket,
    /// Postmortem document
    PostmortemDoc,
    /// Public status page entry
    StatusPage,
    /// Runbook used during response
    Runbook,
}

text_enum!(LinkType, "link type", {
    SlackChannel => "slack_channel",
    JiraTicket => "jira_ticket",
    PostmortemDoc => "postmortem_doc",
    StatusPage => "status_page",
    Runbook => "runbook",
});

/// A tracked incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Unique identifier, immutable once assigned
    pub id: IncidentId,

    /// Incident title (non-empty)
    pub title: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Current lifecycle status
    pub status: IncidentStatus,

    /// Severity, always set
    pub severity: Severity,

    /// Tier of the affected service
    #[serde(default)]
    pub service_tier: Option<ServiceTier>,

    /// Private incidents are visible only to involved users and superusers
    #[serde(default)]
    pub is_private: bool,

    /// Incident captain
    #[serde(default)]
    pub captain: Option<UserId>,

    /// User who reported the incident
    #[serde(default)]
    pub reporter: Option<UserId>,

    /// Participants. Grows by reconciliation or explicit add, never pruned.
    #[serde(default)]
    pub participants: BTreeSet<UserId>,

    /// Affected-service tags
    #[serde(default)]
    pub affected_services: BTreeSet<TagId>,

    /// Root-cause tags
    #[serde(default)]
    pub root_causes: BTreeSet<TagId>,

    /// Impact-type tags
    #[serde(default)]
    pub impact_types: BTreeSet<TagId>,

    /// External links keyed by type
    #[serde(default)]
    pub external_links: BTreeMap<LinkType, String>,

    /// Total downtime in seconds
    #[serde(default)]
    pub downtime_seconds: Option<u64>,

    /// Last participant reconciliation
    #[serde(default)]
    pub participants_last_synced_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// First transition to Mitigated
    #[serde(default)]
    pub mitigated_at: Option<DateTime<Utc>>,

    /// First transition to Done or Cancelled
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// External key, e.g. `INC-2000`.
    pub fn key(&self, prefix: &str) -> String {
        self.id.key(prefix)
    }

    /// Check the record-level invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyTitle`] or [`ValidationError::TitleTooLong`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)
    }

    /// Tag set for the given kind.
    pub fn tags(&self, kind: TagKind) -> &BTreeSet<TagId> {
        match kind {
            TagKind::AffectedService => &self.affected_services,
            TagKind::RootCause => &self.root_causes,
            TagKind::ImpactType => &self.impact_types,
        }
    }

    /// Mutable tag set for the given kind.
    pub fn tags_mut(&mut self, kind: TagKind) -> &mut BTreeSet<TagId> {
        match kind {
            TagKind::AffectedService => &mut self.affected_services,
            TagKind::RootCause => &mut self.root_causes,
            TagKind::ImpactType => &mut self.impact_types,
        }
    }

    /// URL stored for a link type.
    pub fn external_link(&self, link_type: LinkType) -> Option<&str> {
        self.external_links.get(&link_type).map(String::as_str)
    }

    /// Whether the user is captain, reporter, or a participant.
    pub fn involves(&self, user: UserId) -> bool {
        self.captain == Some(user) || self.reporter == Some(user) || self.participants.contains(&user)
    }

    /// Record a status change, stamping lifecycle timestamps on first entry.
    pub(crate) fn transition(&mut self, status: IncidentStatus, now: DateTime<Utc>) {
        self.status = status;
        if status == IncidentStatus::Mitigated && self.mitigated_at.is_none() {
            self.mitigated_at = Some(now);
        }
        if status.is_closed() && self.closed_at.is_none() {
            self.closed_at = Some(now);
        }
    }
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let actual = trimmed.chars().count();
    if actual > MAX_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong {
            max: MAX_TITLE_LENGTH,
            actual,
        });
    }
    Ok(())
}

/// Data for creating a new incident
#[derive(Debug, Clone, Default)]
pub struct NewIncident {
    /// Incident title
    pub title: String,

    /// Description
    pub description: String,

    /// Severity (required; `None` fails validation)
    pub severity: Option<Severity>,

    /// Service tier
    pub service_tier: Option<ServiceTier>,

    /// Private flag
    pub is_private: bool,

    /// Captain
    pub captain: Option<UserId>,

    /// Reporter
    pub reporter: Option<UserId>,

    /// Downtime in human form, e.g. `"1h 30m"`
    pub downtime: Option<String>,
}

impl NewIncident {
    /// Validate the creation request.
    ///
    /// On success returns the severity and the parsed downtime.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found: title, then severity,
    /// then downtime.
    pub fn validate(&self) -> Result<(Severity, Option<u64>), ValidationError> {
        validate_title(&self.title)?;
        let severity = self.severity.ok_or(ValidationError::MissingSeverity)?;
        let downtime = self.downtime.as_deref().map(duration::parse).transpose()?;
        Ok((severity, downtime))
    }
}

/// Data for updating an existing incident
#[derive(Debug, Clone, Default)]
pub struct IncidentUpdate {
    /// New title
    pub title: Option<String>,

    /// New description
    pub description: Option<String>,

    /// New status
    pub status: Option<IncidentStatus>,

    /// New severity
    pub severity: Option<Severity>,

    /// New service tier (`Some(None)` clears)
    pub service_tier: Option<Option<ServiceTier>>,

    /// New private flag
    pub is_private: Option<bool>,

    /// New captain (`Some(None)` clears)
    pub captain: Option<Option<UserId>>,

    /// New reporter (`Some(None)` clears)
    pub reporter: Option<Option<UserId>>,

    /// New downtime text (`Some(None)` clears)
    pub downtime: Option<Option<String>>,
}

/// Filter for querying incidents
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    /// Filter by status
    pub status: Option<IncidentStatus>,

    /// Filter by severity
    pub severity: Option<Severity>,

    /// Only incidents this user participates in
    pub participant: Option<UserId>,

    /// Limit number of results
    pub limit: Option<usize>,
}

impl IncidentFilter {
    /// Whether an incident passes every set criterion (limit excluded).
    pub fn matches(&self, incident: &Incident) -> bool {
        if let Some(status) = self.status {
            if incident.status != status {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if incident.severity != severity {
                return false;
            }
        }
        if let Some(user) = self.participant {
            if !incident.participants.contains(&user) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn new_incident(title: &str, severity: Option<Severity>) -> NewIncident {
        NewIncident {
            title: title.to_string(),
            severity,
            ..Default::default()
        }
    }

    #[test]
    fn test_incident_key() {
        assert_eq!(IncidentId::new(2000).key("INC"), "INC-2000");
    }

    #[rstest]
    #[case::bare("2001", Some(2001))]
    #[case::keyed("INC-2001", Some(2001))]
    #[case::padded("  INC-7 ", Some(7))]
    #[case::garbage("INC-abc", None)]
    #[case::no_prefix("-5", None)]
    #[case::two_dashes("a-b-7", None)]
    #[case::signed("+5", None)]
    #[case::empty_number("INC-", None)]
    #[case::overflow("99999999999999999999", None)]
    fn test_parse_key(#[case] input: &str, #[case] expected: Option<u64>) {
        assert_eq!(IncidentId::parse_key(input), expected.map(IncidentId::new));
    }

    #[test]
    fn test_validate_requires_title() {
        let err = new_incident("   ", Some(Severity::P1)).validate().unwrap_err();
        assert_eq!(err, ValidationError::EmptyTitle);
    }

    #[test]
    fn test_validate_requires_severity() {
        let err = new_incident("DB down", None).validate().unwrap_err();
        assert_eq!(err, ValidationError::MissingSeverity);
    }

    #[test]
    fn test_validate_rejects_long_title() {
        let title = "x".repeat(MAX_TITLE_LENGTH + 1);
        let err = new_incident(&title, Some(Severity::P2)).validate().unwrap_err();
        assert!(matches!(err, ValidationError::TitleTooLong { .. }));
    }

    #[test]
    fn test_validate_parses_downtime() {
        let mut new = new_incident("API errors", Some(Severity::P2));
        new.downtime = Some("1h 5m".to_string());
        assert_eq!(new.validate().unwrap(), (Severity::P2, Some(3900)));

        new.downtime = Some("1h1h".to_string());
        assert!(matches!(
            new.validate().unwrap_err(),
            ValidationError::Duration(duration::DurationError::DuplicateUnit('h'))
        ));
    }

    #[rstest]
    #[case("active", IncidentStatus::Active)]
    #[case("Mitigated", IncidentStatus::Mitigated)]
    #[case("CANCELLED", IncidentStatus::Cancelled)]
    fn test_status_from_str(#[case] input: &str, #[case] expected: IncidentStatus) {
        assert_eq!(input.parse::<IncidentStatus>().unwrap(), expected);
    }

    #[test]
    fn test_enum_parse_error_lists_values() {
        let err = "p9".parse::<Severity>().unwrap_err();
        assert!(err.to_string().contains("P0"));
        assert_eq!("p1".parse::<Severity>().unwrap(), Severity::P1);
        assert_eq!("slack_channel".parse::<LinkType>().unwrap(), LinkType::SlackChannel);
    }

    #[test]
    fn test_link_type_serializes_snake_case() {
        let json = serde_json::to_string(&LinkType::PostmortemDoc).unwrap();
        assert_eq!(json, "\"postmortem_doc\"");
    }
}
