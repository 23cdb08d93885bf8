//! Configuration management for flare.
//!
//! Configuration lives in `.flare/config.yaml`:
//!
//! ```yaml
//! incident-prefix: INC
//! allocation:
//!   id-floor: 2000
//!   lock-timeout-ms: 5000
//! participant-sync:
//!   throttle-secs: 300
//!   channel-link: slack_channel
//!   bot-id-prefix: B
//!   adapter-timeout-secs: 10
//!   stub-email-domain: chat.invalid
//! storage:
//!   backend: memory
//!   data-file: .flare/incidents.jsonl
//! ```
//!
//! Every section is optional; missing keys take their defaults.

use crate::domain::LinkType;
use crate::error::{ConfigError, Result};
use crate::id_allocation::DEFAULT_ID_FLOOR;
use crate::storage::{StorageBackend, StoreSettings};
use crate::sync::SyncConfig;
use crate::users::DEFAULT_STUB_EMAIL_DOMAIN;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Default incident key prefix
pub const DEFAULT_PREFIX: &str = "INC";

/// Name of the flare directory
pub const FLARE_DIR_NAME: &str = ".flare";

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the incidents data file
pub const INCIDENTS_FILE_NAME: &str = "incidents.jsonl";

/// Minimum prefix length
pub const MIN_PREFIX_LENGTH: usize = 2;

/// Maximum prefix length
pub const MAX_PREFIX_LENGTH: usize = 20;

/// Configuration file structure for flare
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct FlareConfig {
    /// Incident key prefix (e.g., "INC" for "INC-2000")
    #[serde(default = "default_prefix")]
    pub incident_prefix: String,

    /// ID allocation settings
    #[serde(default)]
    pub allocation: AllocationConfig,

    /// Participant reconciliation settings
    #[serde(default)]
    pub participant_sync: ParticipantSyncConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

/// ID allocation section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct AllocationConfig {
    /// First incident ID
    pub id_floor: u64,

    /// Maximum wait for the counter lock, in milliseconds
    pub lock_timeout_ms: u64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            id_floor: DEFAULT_ID_FLOOR,
            lock_timeout_ms: 5000,
        }
    }
}

/// Participant reconciliation section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ParticipantSyncConfig {
    /// Minimum seconds between non-forced reconciliations
    pub throttle_secs: u64,

    /// Link type that holds the incident channel URL
    pub channel_link: LinkType,

    /// Member id prefix identifying bots
    pub bot_id_prefix: String,

    /// Timeout for each directory call, in seconds
    pub adapter_timeout_secs: u64,

    /// Domain for emails synthesized when the directory has none
    pub stub_email_domain: String,
}

impl Default for ParticipantSyncConfig {
    fn default() -> Self {
        Self {
            throttle_secs: 300,
            channel_link: LinkType::SlackChannel,
            bot_id_prefix: "B".to_string(),
            adapter_timeout_secs: 10,
            stub_email_domain: DEFAULT_STUB_EMAIL_DOMAIN.to_string(),
        }
    }
}

/// Storage configuration section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Storage backend type ("memory" for in-memory with JSONL persistence)
    pub backend: String,

    /// Path to the data file, relative to the workspace root
    pub data_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            data_file: format!("{FLARE_DIR_NAME}/{INCIDENTS_FILE_NAME}"),
        }
    }
}

impl StorageConfig {
    /// Backend for a workspace rooted at `root_dir`.
    pub fn to_backend(&self, root_dir: &Path) -> StorageBackend {
        let data_file = PathBuf::from(&self.data_file);
        if data_file.is_absolute() {
            StorageBackend::Jsonl(data_file)
        } else {
            StorageBackend::Jsonl(root_dir.join(data_file))
        }
    }
}

impl FlareConfig {
    /// Create a new configuration with the given prefix
    pub fn new(prefix: &str) -> Self {
        Self {
            incident_prefix: prefix.to_string(),
            allocation: AllocationConfig::default(),
            participant_sync: ParticipantSyncConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Load and validate configuration from a file
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, or a config error if
    /// it cannot be parsed or fails [`FlareConfig::validate`].
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Self = serde_yaml::from_str(&content).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(ConfigError::from)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad key.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        validate_prefix(&self.incident_prefix)?;

        if self.allocation.id_floor == 0 {
            return Err(invalid("allocation.id-floor", "must be at least 1"));
        }
        if self.allocation.lock_timeout_ms == 0 {
            return Err(invalid("allocation.lock-timeout-ms", "must be positive"));
        }
        if self.participant_sync.adapter_timeout_secs == 0 {
            return Err(invalid(
                "participant-sync.adapter-timeout-secs",
                "must be positive",
            ));
        }
        if self.participant_sync.bot_id_prefix.trim().is_empty() {
            return Err(invalid(
                "participant-sync.bot-id-prefix",
                "cannot be empty",
            ));
        }
        let domain = &self.participant_sync.stub_email_domain;
        if domain.is_empty() || domain.contains(['@', ' ']) {
            return Err(invalid(
                "participant-sync.stub-email-domain",
                "must be a bare domain name",
            ));
        }
        if self.storage.backend != "memory" {
            return Err(invalid(
                "storage.backend",
                format!("unsupported backend '{}'", self.storage.backend),
            ));
        }
        Ok(())
    }

    /// Store tunables derived from this configuration.
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            id_floor: self.allocation.id_floor,
            lock_timeout: Duration::from_millis(self.allocation.lock_timeout_ms),
        }
    }

    /// Reconciliation settings derived from this configuration.
    pub fn sync_config(&self) -> SyncConfig {
        let sync = &self.participant_sync;
        SyncConfig {
            throttle_window: Duration::from_secs(sync.throttle_secs),
            channel_link: sync.channel_link,
            bot_id_prefix: sync.bot_id_prefix.clone(),
            adapter_timeout: Duration::from_secs(sync.adapter_timeout_secs),
            incident_prefix: self.incident_prefix.clone(),
        }
    }
}

impl Default for FlareConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Validate incident key prefix format.
///
/// Requirements:
/// - 2-20 characters
/// - Alphanumeric only (letters and digits)
///
/// Note: Expects pre-trimmed input. Callers should trim whitespace before calling.
pub fn validate_prefix(prefix: &str) -> std::result::Result<(), ConfigError> {
    if prefix.len() < MIN_PREFIX_LENGTH {
        return Err(invalid(
            "incident-prefix",
            format!("must be at least {MIN_PREFIX_LENGTH} characters"),
        ));
    }

    if prefix.len() > MAX_PREFIX_LENGTH {
        return Err(invalid(
            "incident-prefix",
            format!("cannot exceed {MAX_PREFIX_LENGTH} characters"),
        ));
    }

    if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid(
            "incident-prefix",
            "must contain only alphanumeric characters",
        ));
    }

    Ok(())
}
