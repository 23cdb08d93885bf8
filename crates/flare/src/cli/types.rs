//! CLI value enums and domain type conversions.
//!
//! This module contains the value enums used for CLI argument parsing
//! and their conversions to domain types.

use clap::ValueEnum;

use crate::domain::{IncidentStatus, LinkType, ServiceTier, Severity, TagKind};

/// Incident status for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusArg {
    /// Ongoing
    Active,
    /// Impact stopped
    Mitigated,
    /// Postmortem in progress
    Postmortem,
    /// Closed
    Done,
    /// Declared in error
    Cancelled,
}

impl From<StatusArg> for IncidentStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => IncidentStatus::Active,
            StatusArg::Mitigated => IncidentStatus::Mitigated,
            StatusArg::Postmortem => IncidentStatus::Postmortem,
            StatusArg::Done => IncidentStatus::Done,
            StatusArg::Cancelled => IncidentStatus::Cancelled,
        }
    }
}

/// Severity for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityArg {
    /// Critical
    #[value(name = "P0", alias = "p0")]
    P0,
    /// High
    #[value(name = "P1", alias = "p1")]
    P1,
    /// Medium
    #[value(name = "P2", alias = "p2")]
    P2,
    /// Low
    #[value(name = "P3", alias = "p3")]
    P3,
    /// Informational
    #[value(name = "P4", alias = "p4")]
    P4,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::P0 => Severity::P0,
            SeverityArg::P1 => Severity::P1,
            SeverityArg::P2 => Severity::P2,
            SeverityArg::P3 => Severity::P3,
            SeverityArg::P4 => Severity::P4,
        }
    }
}

/// Service tier for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierArg {
    /// Business critical
    #[value(name = "T0", alias = "t0")]
    T0,
    /// Tier 1
    #[value(name = "T1", alias = "t1")]
    T1,
    /// Tier 2
    #[value(name = "T2", alias = "t2")]
    T2,
    /// Tier 3
    #[value(name = "T3", alias = "t3")]
    T3,
    /// Tier 4
    #[value(name = "T4", alias = "t4")]
    T4,
}

impl From<TierArg> for ServiceTier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::T0 => ServiceTier::T0,
            TierArg::T1 => ServiceTier::T1,
            TierArg::T2 => ServiceTier::T2,
            TierArg::T3 => ServiceTier::T3,
            TierArg::T4 => ServiceTier::T4,
        }
    }
}

/// External link type for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTypeArg {
    /// Incident chat channel
    #[value(name = "slack_channel", alias = "slack-channel")]
    SlackChannel,
    /// Tracking ticket
    #[value(name = "jira_ticket", alias = "jira-ticket")]
    JiraTicket,
    /// Postmortem document
    #[value(name = "postmortem_doc", alias = "postmortem-doc")]
    PostmortemDoc,
    /// Status page entry
    #[value(name = "status_page", alias = "status-page")]
    StatusPage,
    /// Runbook
    Runbook,
}

impl From<LinkTypeArg> for LinkType {
    fn from(arg: LinkTypeArg) -> Self {
        match arg {
            LinkTypeArg::SlackChannel => LinkType::SlackChannel,
            LinkTypeArg::JiraTicket => LinkType::JiraTicket,
            LinkTypeArg::PostmortemDoc => LinkType::PostmortemDoc,
            LinkTypeArg::StatusPage => LinkType::StatusPage,
            LinkTypeArg::Runbook => LinkType::Runbook,
        }
    }
}

/// Tag kind for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKindArg {
    /// Affected service
    #[value(name = "service")]
    AffectedService,
    /// Root cause
    #[value(name = "root-cause")]
    RootCause,
    /// Impact type
    #[value(name = "impact")]
    ImpactType,
}

impl From<TagKindArg> for TagKind {
    fn from(arg: TagKindArg) -> Self {
        match arg {
            TagKindArg::AffectedService => TagKind::AffectedService,
            TagKindArg::RootCause => TagKind::RootCause,
            TagKindArg::ImpactType => TagKind::ImpactType,
        }
    }
}
