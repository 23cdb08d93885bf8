use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a tag name.
pub const MAX_TAG_NAME_LENGTH: usize = 64;

/// Tag identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(u64);

impl TagId {
    /// Wrap a raw identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw numeric value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which tag set a tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    /// Service that was affected
    AffectedService,
    /// Root cause category
    RootCause,
    /// Kind of customer impact
    ImpactType,
}

/// Named tag, unique per kind ignoring case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Identifier
    pub id: TagId,

    /// Tag set
    pub kind: TagKind,

    /// Name as first entered
    pub name: String,
}

impl Tag {
    /// Uniqueness key: kind plus lower-cased name.
    pub fn unique_key(&self) -> (TagKind, String) {
        (self.kind, self.name.to_lowercase())
    }

    /// Trim and check a candidate tag name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTagName`] if the name is empty or
    /// longer than [`MAX_TAG_NAME_LENGTH`].
    pub fn normalize_name(name: &str) -> Result<String, ValidationError> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.chars().count() > MAX_TAG_NAME_LENGTH {
            return Err(ValidationError::InvalidTagName(name.to_string()));
        }
        Ok(trimmed.to_string())
    }
}
