//! Implementation of the `init` command.
//!
//! This module handles initialization of a new flare workspace, creating
//! the `.flare/` directory structure with configuration and data files.

use crate::config::{
    FlareConfig, CONFIG_FILE_NAME, DEFAULT_PREFIX, FLARE_DIR_NAME, INCIDENTS_FILE_NAME,
};
use crate::domain::IncidentId;
use crate::error::{ConfigError, Result};
use crate::id_allocation::DEFAULT_ID_FLOOR;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Name of the gitignore file within .flare
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";

/// Maximum directory depth to traverse when searching for the flare root
pub const MAX_TRAVERSAL_DEPTH: usize = 256;

/// Settings chosen at `flare init` time.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Incident key prefix; [`DEFAULT_PREFIX`] when unset
    pub prefix: Option<String>,

    /// First incident number; [`DEFAULT_ID_FLOOR`] when unset
    pub id_floor: Option<u64>,
}

/// Result of the init command
#[derive(Debug)]
pub struct InitResult {
    /// Path to the created flare directory
    pub flare_dir: PathBuf,
    /// Path to the created config file
    pub config_file: PathBuf,
    /// Path to the created incidents file
    pub incidents_file: PathBuf,
    /// The configuration written to `config_file`
    pub config: FlareConfig,
}

impl InitResult {
    /// Key the first incident will receive, e.g. `INC-2000`.
    pub fn first_key(&self) -> String {
        IncidentId::new(self.config.allocation.id_floor).key(&self.config.incident_prefix)
    }
}

/// Initialize a new flare workspace in the given directory.
///
/// The incidents file starts empty with no counter record, so the first
/// create allocates the configured floor.
///
/// # Errors
///
/// - `ConfigError::InvalidValue` for a bad prefix or a zero floor; nothing
///   is written
/// - `ConfigError::AlreadyInitialized` if `.flare/` already exists
/// - `Error::Io` if a file cannot be written
pub async fn init(base_dir: &Path, options: &InitOptions) -> Result<InitResult> {
    let prefix = options.prefix.as_deref().unwrap_or(DEFAULT_PREFIX).trim();
    let mut config = FlareConfig::new(prefix);
    config.allocation.id_floor = options.id_floor.unwrap_or(DEFAULT_ID_FLOOR);
    config.validate()?;

    let flare_dir = base_dir.join(FLARE_DIR_NAME);
    if flare_dir.exists() {
        return Err(ConfigError::AlreadyInitialized(FLARE_DIR_NAME.to_string()).into());
    }

    fs::create_dir_all(&flare_dir).await?;

    let config_file = flare_dir.join(CONFIG_FILE_NAME);
    config.save(&config_file).await?;

    let incidents_file = flare_dir.join(INCIDENTS_FILE_NAME);
    fs::write(&incidents_file, "").await?;

    // Atomic saves leave incidents.tmp behind if interrupted
    fs::write(flare_dir.join(GITIGNORE_FILE_NAME), "*.tmp\n").await?;

    tracing::info!(
        dir = %flare_dir.display(),
        prefix = %config.incident_prefix,
        id_floor = config.allocation.id_floor,
        "Initialized flare workspace"
    );

    Ok(InitResult {
        flare_dir,
        config_file,
        incidents_file,
        config,
    })
}

/// Check if a directory has been initialized with flare.
pub fn is_initialized(base_dir: &Path) -> bool {
    base_dir.join(FLARE_DIR_NAME).exists()
}

/// Find the flare root directory by searching up the directory tree.
///
/// Returns the directory containing `.flare/`, or `None` if none is found
/// within [`MAX_TRAVERSAL_DEPTH`] levels.
pub fn find_flare_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    let mut depth = 0;

    loop {
        if current.join(FLARE_DIR_NAME).exists() {
            return Some(current);
        }

        depth += 1;
        if depth > MAX_TRAVERSAL_DEPTH || !current.pop() {
            return None;
        }
    }
}
