//! Application context for CLI command execution.
//!
//! This module provides the `App` struct that manages storage lifecycle
//! and wires the reconciliation components for CLI commands.
//!
//! # Example
//!
//! ```no_run
//! use flare::app::App;
//! use std::path::Path;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let app = App::from_directory(Path::new(".")).await?;
//!     // Execute commands using app...
//!     Ok(())
//! }
//! ```

use crate::commands::init::find_flare_root;
use crate::config::{FlareConfig, CONFIG_FILE_NAME, FLARE_DIR_NAME};
use crate::directory::DirectoryAdapter;
use crate::error::{ConfigError, Result};
use crate::storage::{create_storage, IncidentStorage};
use crate::sync::ParticipantSync;
use crate::users::UserResolver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Application context for CLI operations.
///
/// Storage is loaded from the flare directory on creation.
pub struct App {
    /// The storage backend
    storage: Arc<dyn IncidentStorage>,

    /// Path to the flare directory (.flare)
    flare_dir: PathBuf,

    /// Loaded configuration
    config: FlareConfig,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("flare_dir", &self.flare_dir)
            .field("config", &self.config)
            .field("storage", &"<dyn IncidentStorage>")
            .finish()
    }
}

impl App {
    /// Create an App instance from the given working directory.
    ///
    /// Searches up the directory tree to find a `.flare/` directory,
    /// loads configuration, and initializes storage.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No flare workspace is found in the directory tree
    /// - Configuration cannot be loaded
    /// - Storage initialization fails
    pub async fn from_directory(working_dir: &Path) -> Result<Self> {
        let root_dir = find_flare_root(working_dir)
            .ok_or_else(|| ConfigError::NotInitialized(working_dir.display().to_string()))?;

        let flare_dir = root_dir.join(FLARE_DIR_NAME);
        let config = FlareConfig::load(&flare_dir.join(CONFIG_FILE_NAME)).await?;

        let backend = config.storage.to_backend(&root_dir);
        let storage = create_storage(backend, config.store_settings()).await?;

        Ok(Self {
            storage,
            flare_dir,
            config,
        })
    }

    /// Shared handle to the storage.
    pub fn storage(&self) -> Arc<dyn IncidentStorage> {
        Arc::clone(&self.storage)
    }

    /// Loaded configuration.
    pub fn config(&self) -> &FlareConfig {
        &self.config
    }

    /// Get the incident key prefix.
    pub fn prefix(&self) -> &str {
        &self.config.incident_prefix
    }

    /// Get the path to the flare directory.
    pub fn flare_dir(&self) -> &Path {
        &self.flare_dir
    }

    /// User resolver over this app's store and the given directory.
    pub fn user_resolver(&self, directory: Arc<dyn DirectoryAdapter>) -> UserResolver {
        let sync = &self.config.participant_sync;
        UserResolver::new(self.storage(), directory)
            .with_lookup_timeout(Duration::from_secs(sync.adapter_timeout_secs))
            .with_stub_email_domain(sync.stub_email_domain.clone())
    }

    /// Reconciliation engine over this app's store and the given directory.
    pub fn participant_sync(&self, directory: Arc<dyn DirectoryAdapter>) -> ParticipantSync {
        let resolver = self.user_resolver(Arc::clone(&directory));
        ParticipantSync::new(self.storage(), directory, resolver, self.config.sync_config())
    }

    /// Save storage state to persistent storage.
    ///
    /// This should be called after any mutating operations.
    pub async fn save(&self) -> Result<()> {
        self.storage.save().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::init;
    use crate::domain::{NewIncident, Severity};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_app_from_initialized_directory() {
        let temp_dir = TempDir::new().unwrap();
        let options = init::InitOptions {
            prefix: Some("OPS".to_string()),
            ..Default::default()
        };
        init::init(temp_dir.path(), &options).await.unwrap();

        let app = App::from_directory(temp_dir.path()).await.unwrap();

        assert_eq!(app.prefix(), "OPS");
        assert!(app.flare_dir().ends_with(".flare"));
    }

    #[tokio::test]
    async fn test_app_from_subdirectory() {
        let temp_dir = TempDir::new().unwrap();
        init::init(temp_dir.path(), &init::InitOptions::default())
            .await
            .unwrap();

        let sub_dir = temp_dir.path().join("src").join("lib");
        std::fs::create_dir_all(&sub_dir).unwrap();

        let app = App::from_directory(&sub_dir).await.unwrap();
        assert_eq!(app.prefix(), "INC");
    }

    #[tokio::test]
    async fn test_app_from_uninitialized_directory() {
        let temp_dir = TempDir::new().unwrap();

        let err = App::from_directory(temp_dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("no .flare directory"));
    }

    #[tokio::test]
    async fn test_saved_incidents_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        init::init(temp_dir.path(), &init::InitOptions::default())
            .await
            .unwrap();

        let app = App::from_directory(temp_dir.path()).await.unwrap();
        let incident = app
            .storage()
            .create(NewIncident {
                title: "Login failures".to_string(),
                severity: Some(Severity::P1),
                ..Default::default()
            })
            .await
            .unwrap();
        app.save().await.unwrap();

        let reopened = App::from_directory(temp_dir.path()).await.unwrap();
        let loaded = reopened.storage().get(incident.id).await.unwrap();
        assert_eq!(loaded.map(|i| i.title), Some("Login failures".to_string()));
    }
}
