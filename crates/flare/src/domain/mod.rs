//! Domain types for incident tracking.
//!
//! This module contains the core domain types: incidents and their
//! lifecycle enums, canonical users with external identity links, and
//! case-insensitively unique tags.

mod incident;
mod tag;
mod user;

pub use incident::{
    Incident, IncidentFilter, IncidentId, IncidentStatus, IncidentUpdate, LinkType, NewIncident,
    ParseEnumError, ServiceTier, Severity, MAX_TITLE_LENGTH,
};
pub use tag::{Tag, TagId, TagKind, MAX_TAG_NAME_LENGTH};
pub use user::{
    is_secure_absolute_url, normalize_email, IdentityLink, IdentityType, NewUser, ProfileUpdate,
    User, UserId,
};
