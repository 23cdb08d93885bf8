use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Surrogate user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    /// Wrap a raw identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw numeric value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External system an identity link points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityType {
    /// Chat system user id (e.g. `U024BE7LH`)
    Chat,

    /// Subject from the SSO / identity-aware proxy
    Sso,
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityType::Chat => f.write_str("chat"),
            IdentityType::Sso => f.write_str("sso"),
        }
    }
}

/// Reverse-lookup link from an external identity to a local user.
///
/// At most one link per `(user, identity_type)`, and each
/// `(identity_type, external_id)` belongs to at most one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityLink {
    /// External system
    pub identity_type: IdentityType,

    /// Identifier within that system
    pub external_id: String,
}

impl IdentityLink {
    /// Build a link.
    pub fn new(identity_type: IdentityType, external_id: impl Into<String>) -> Self {
        Self {
            identity_type,
            external_id: external_id.into(),
        }
    }
}

/// Canonical user record, keyed by email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Surrogate id
    pub id: UserId,

    /// Email, lower-cased; unique
    pub email: String,

    /// Given name
    #[serde(default)]
    pub first_name: String,

    /// Family name
    #[serde(default)]
    pub last_name: String,

    /// Display name from the directory
    #[serde(default)]
    pub display_name: String,

    /// Avatar URL (always `https://`)
    #[serde(default)]
    pub avatar_url: Option<String>,

    /// Superusers see every incident
    #[serde(default)]
    pub is_superuser: bool,

    /// Resolved users never get a login password
    #[serde(default)]
    pub password_usable: bool,

    /// External identity links
    #[serde(default)]
    pub identities: Vec<IdentityLink>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Link of the given type, if any.
    pub fn identity(&self, identity_type: IdentityType) -> Option<&IdentityLink> {
        self.identities
            .iter()
            .find(|link| link.identity_type == identity_type)
    }

    /// Best human-readable name: display name, then full name, then email.
    pub fn name(&self) -> String {
        if !self.display_name.trim().is_empty() {
            return self.display_name.clone();
        }
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }

    /// Whether name fields are still unset.
    pub fn has_empty_profile(&self) -> bool {
        self.first_name.is_empty() && self.last_name.is_empty() && self.display_name.is_empty()
    }
}

/// Data for creating a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    /// Email (normalized by the store)
    pub email: String,

    /// Given name
    pub first_name: String,

    /// Family name
    pub last_name: String,

    /// Display name
    pub display_name: String,

    /// Avatar URL; invalid values are dropped
    pub avatar_url: Option<String>,

    /// Superuser flag
    pub is_superuser: bool,
}

impl NewUser {
    /// Minimal user with only an email.
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    /// New given name
    pub first_name: Option<String>,

    /// New family name
    pub last_name: Option<String>,

    /// New display name
    pub display_name: Option<String>,

    /// New avatar URL; invalid values are dropped
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    /// Whether this update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.display_name.is_none()
            && self.avatar_url.is_none()
    }
}

/// Lower-case and trim an email, rejecting values without a local part and
/// a domain.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidEmail`] for unusable addresses.
pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let normalized = email.trim().to_lowercase();
    let valid = match normalized.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !normalized.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(normalized)
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}

/// Whether `url` is an absolute `https://` URL with a host.
pub fn is_secure_absolute_url(url: &str) -> bool {
    let Some(rest) = url.strip_prefix("https://") else {
        return false;
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    !host.is_empty()
        && !host.starts_with(':')
        && !url.chars().any(char::is_whitespace)
}
