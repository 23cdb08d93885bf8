//! Storage abstraction layer for flare.
//!
//! This module provides the core storage trait and factory for creating
//! storage backends:
//!
//! - **In-memory**: Fast, ephemeral storage guarded by a single async mutex
//! - **JSONL**: The in-memory store plus file persistence in JSON Lines format
//!
//! # Architecture
//!
//! The storage layer uses an async trait so that a database-backed
//! implementation can slot in behind the same interface. Every method takes
//! `&self`: the store is shared (`Arc<dyn IncidentStorage>`) between request
//! handlers, the user resolver, and the reconciliation engine, and each
//! implementation provides its own transactional discipline.
//!
//! # Example
//!
//! ```no_run
//! use flare::domain::{NewIncident, Severity};
//! use flare::storage::{create_storage, StorageBackend, StoreSettings};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = create_storage(StorageBackend::InMemory, StoreSettings::default()).await?;
//!
//!     let incident = storage
//!         .create(NewIncident {
//!             title: "Checkout latency".to_string(),
//!             severity: Some(Severity::P1),
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("Created incident: {}", incident.key("INC"));
//!
//!     Ok(())
//! }
//! ```

use crate::domain::{
    IdentityLink, IdentityType, Incident, IncidentFilter, IncidentId, IncidentUpdate, LinkType,
    NewIncident, NewUser, ProfileUpdate, Tag, TagKind, User, UserId,
};
use crate::error::Result;
use crate::id_allocation::{IdCounterState, DEFAULT_ID_FLOOR};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub mod in_memory;

use in_memory::InMemoryStore;

/// Core storage trait for incidents and users.
///
/// # Method Categories
///
/// - **Incidents**: `create`, `get`, `update`, `list`
/// - **Incident relations**: `set_external_link`, `remove_external_link`,
///   `add_participants`, `mark_participants_synced`, `add_tag`, `list_tags`
/// - **Users**: `get_user`, `find_user_by_email`, `find_user_by_identity`,
///   `insert_user`, `attach_identity`, `update_profile`, `list_users`
/// - **Batch Operations**: `import`, `export_all`
/// - **Persistence**: `save`, `reload`
///
/// # Error Handling
///
/// - `Error::Validation`: input rejected before any write
/// - `Error::Allocation`: ID issuance failed; the create was rolled back
/// - `Error::IncidentNotFound` / `Error::UserNotFound`: missing entity
/// - `Error::Storage(StorageError::UniqueViolation)`: a unique key
///   (user email, identity link, tag name) is already taken
///
/// # Concurrency
///
/// `create` must allocate the incident ID inside the same critical section
/// that persists the incident. Every other method touches a single entity
/// and needs no cross-entity lock ordering.
#[async_trait]
pub trait IncidentStorage: Send + Sync {
    // ========== Incidents ==========

    /// Create a new incident.
    ///
    /// Allocates the ID, validates, and persists as one unit: on any error
    /// no incident is stored and no ID is consumed.
    ///
    /// # Errors
    ///
    /// - `Error::Allocation` if the ID counter cannot be locked or advanced
    /// - `Error::Validation` for an empty title, missing severity, or bad
    ///   downtime text
    /// - `Error::UserNotFound` if captain or reporter does not exist
    async fn create(&self, incident: NewIncident) -> Result<Incident>;

    /// Get an incident by ID.
    ///
    /// Returns `None` if the incident doesn't exist.
    async fn get(&self, id: IncidentId) -> Result<Option<Incident>>;

    /// Apply a partial update. Either every field applies or none does.
    ///
    /// # Errors
    ///
    /// - `Error::IncidentNotFound` if the incident doesn't exist
    /// - `Error::Validation` if the result would be invalid
    /// - `Error::UserNotFound` for an unknown captain or reporter
    async fn update(&self, id: IncidentId, updates: IncidentUpdate) -> Result<Incident>;

    /// List incidents matching the filter, newest ID first.
    ///
    /// Visibility is not applied here; see [`crate::visibility`].
    async fn list(&self, filter: &IncidentFilter) -> Result<Vec<Incident>>;

    // ========== Incident relations ==========

    /// Set the URL for a link type, replacing any previous one.
    async fn set_external_link(
        &self,
        id: IncidentId,
        link_type: LinkType,
        url: &str,
    ) -> Result<Incident>;

    /// Remove the URL for a link type. No-op if absent.
    async fn remove_external_link(&self, id: IncidentId, link_type: LinkType) -> Result<Incident>;

    /// Add users to the participant set in one batched union.
    ///
    /// Existing participants are untouched; nothing is ever removed.
    ///
    /// # Errors
    ///
    /// - `Error::IncidentNotFound` if the incident doesn't exist
    /// - `Error::UserNotFound` if any user doesn't exist (nothing is added)
    async fn add_participants(
        &self,
        id: IncidentId,
        users: &[UserId],
    ) -> Result<ParticipantsAdded>;

    /// Record the time of the last participant reconciliation.
    async fn mark_participants_synced(
        &self,
        id: IncidentId,
        at: DateTime<Utc>,
    ) -> Result<Incident>;

    /// Attach a tag, creating it if no tag of that kind has the same name
    /// ignoring case.
    async fn add_tag(&self, id: IncidentId, kind: TagKind, name: &str) -> Result<Incident>;

    /// All tags, optionally of one kind, ordered by ID.
    async fn list_tags(&self, kind: Option<TagKind>) -> Result<Vec<Tag>>;

    // ========== Users ==========

    /// Get a user by ID.
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Find a user by email, ignoring case.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Find the user owning an external identity.
    async fn find_user_by_identity(
        &self,
        identity_type: IdentityType,
        external_id: &str,
    ) -> Result<Option<User>>;

    /// Insert a user. Login is disabled for every inserted user.
    ///
    /// # Errors
    ///
    /// - `Error::Validation` for an unusable email
    /// - `Error::Storage(StorageError::UniqueViolation)` if the email is taken
    async fn insert_user(&self, user: NewUser) -> Result<User>;

    /// Attach an identity link to a user. Re-attaching the same link is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// - `Error::UserNotFound` if the user doesn't exist
    /// - `Error::Storage(StorageError::UniqueViolation)` if the identity
    ///   belongs to another user, or the user already has a different link
    ///   of that type
    async fn attach_identity(&self, id: UserId, link: IdentityLink) -> Result<User>;

    /// Update profile fields.
    async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User>;

    /// All users ordered by ID.
    async fn list_users(&self) -> Result<Vec<User>>;

    // ========== Batch Operations ==========

    /// Import records, e.g. from a JSONL file or a migration.
    ///
    /// A snapshot without a counter leaves the current counter as is, so a
    /// missing counter self-heals on the next create. User emails are
    /// lower-cased.
    ///
    /// # Errors
    ///
    /// - `StorageError::UniqueViolation` if a snapshot record reuses an
    ///   existing ID or unique key; nothing is imported
    /// - `ValidationError` for an invalid email or incident
    async fn import(&self, snapshot: StoreSnapshot) -> Result<()>;

    /// Export every record.
    async fn export_all(&self) -> Result<StoreSnapshot>;

    // ========== Persistence ==========

    /// Save changes to persistent storage. No-op for in-memory storage.
    async fn save(&self) -> Result<()>;

    /// Reload state from persistent storage, discarding unsaved changes.
    /// No-op for in-memory storage.
    async fn reload(&self) -> Result<()>;
}

/// Outcome of [`IncidentStorage::add_participants`].
#[derive(Debug, Clone)]
pub struct ParticipantsAdded {
    /// The incident after the union
    pub incident: Incident,

    /// How many of the given users were not participants yet
    pub added: usize,
}

/// Every record in a store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    /// The ID counter row, if present
    pub counter: Option<IdCounterState>,

    /// Tags
    pub tags: Vec<Tag>,

    /// Users
    pub users: Vec<User>,

    /// Incidents
    pub incidents: Vec<Incident>,
}

/// Tunables shared by every backend.
#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    /// First incident ID
    pub id_floor: u64,

    /// Maximum wait for the ID counter lock
    pub lock_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            id_floor: DEFAULT_ID_FLOOR,
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// In-memory storage (ephemeral)
    InMemory,

    /// JSONL file storage (persistent)
    Jsonl(PathBuf),
}

impl StorageBackend {
    /// Returns the data file path for file-based backends.
    pub fn data_path(&self) -> Option<&Path> {
        match self {
            StorageBackend::Jsonl(path) => Some(path),
            StorageBackend::InMemory => None,
        }
    }
}

/// Adds JSONL file persistence to the in-memory store.
struct JsonlBackedStorage {
    inner: InMemoryStore,
    path: PathBuf,
    settings: StoreSettings,
}

#[async_trait]
impl IncidentStorage for JsonlBackedStorage {
    async fn create(&self, incident: NewIncident) -> Result<Incident> {
        self.inner.create(incident).await
    }

    async fn get(&self, id: IncidentId) -> Result<Option<Incident>> {
        self.inner.get(id).await
    }

    async fn update(&self, id: IncidentId, updates: IncidentUpdate) -> Result<Incident> {
        self.inner.update(id, updates).await
    }

    async fn list(&self, filter: &IncidentFilter) -> Result<Vec<Incident>> {
        self.inner.list(filter).await
    }

    async fn set_external_link(
        &self,
        id: IncidentId,
        link_type: LinkType,
        url: &str,
    ) -> Result<Incident> {
        self.inner.set_external_link(id, link_type, url).await
    }

    async fn remove_external_link(&self, id: IncidentId, link_type: LinkType) -> Result<Incident> {
        self.inner.remove_external_link(id, link_type).await
    }

    async fn add_participants(
        &self,
        id: IncidentId,
        users: &[UserId],
    ) -> Result<ParticipantsAdded> {
        self.inner.add_participants(id, users).await
    }

    async fn mark_participants_synced(
        &self,
        id: IncidentId,
        at: DateTime<Utc>,
    ) -> Result<Incident> {
        self.inner.mark_participants_synced(id, at).await
    }

    async fn add_tag(&self, id: IncidentId, kind: TagKind, name: &str) -> Result<Incident> {
        self.inner.add_tag(id, kind, name).await
    }

    async fn list_tags(&self, kind: Option<TagKind>) -> Result<Vec<Tag>> {
        self.inner.list_tags(kind).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.inner.get_user(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.inner.find_user_by_email(email).await
    }

    async fn find_user_by_identity(
        &self,
        identity_type: IdentityType,
        external_id: &str,
    ) -> Result<Option<User>> {
        self.inner
            .find_user_by_identity(identity_type, external_id)
            .await
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        self.inner.insert_user(user).await
    }

    async fn attach_identity(&self, id: UserId, link: IdentityLink) -> Result<User> {
        self.inner.attach_identity(id, link).await
    }

    async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User> {
        self.inner.update_profile(id, update).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.inner.list_users().await
    }

    async fn import(&self, snapshot: StoreSnapshot) -> Result<()> {
        self.inner.import(snapshot).await
    }

    async fn export_all(&self) -> Result<StoreSnapshot> {
        self.inner.export_all().await
    }

    async fn save(&self) -> Result<()> {
        in_memory::save_to_jsonl(&self.inner, &self.path).await
    }

    async fn reload(&self) -> Result<()> {
        let fresh = if self.path.exists() {
            let (store, warnings) = in_memory::load_from_jsonl(&self.path, self.settings).await?;
            for warning in &warnings {
                tracing::warn!(warning = ?warning, "JSONL reload warning");
            }
            store
        } else {
            InMemoryStore::new(self.settings)
        };
        self.inner.replace_contents(&fresh).await;
        Ok(())
    }
}

/// Create a storage instance for the given backend.
///
/// # Errors
///
/// - `Error::Io` if the JSONL file exists but cannot be read
pub async fn create_storage(
    backend: StorageBackend,
    settings: StoreSettings,
) -> Result<Arc<dyn IncidentStorage>> {
    match backend {
        StorageBackend::InMemory => Ok(Arc::new(InMemoryStore::new(settings))),
        StorageBackend::Jsonl(path) => {
            let inner = if path.exists() {
                let (store, warnings) = in_memory::load_from_jsonl(&path, settings).await?;
                // Log warnings but continue - storage is still usable
                for warning in &warnings {
                    tracing::warn!(warning = ?warning, "JSONL load warning");
                }
                store
            } else {
                InMemoryStore::new(settings)
            };
            Ok(Arc::new(JsonlBackedStorage {
                inner,
                path,
                settings,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use tempfile::TempDir;

    fn new_incident(title: &str) -> NewIncident {
        NewIncident {
            title: title.to_string(),
            severity: Some(Severity::P2),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_jsonl_reload_restores_disk_state() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("incidents.jsonl");

        let storage = create_storage(StorageBackend::Jsonl(path.clone()), StoreSettings::default())
            .await
            .unwrap();

        let created = storage.create(new_incident("Original Title")).await.unwrap();
        storage.save().await.unwrap();

        let update = IncidentUpdate {
            title: Some("Modified Title".to_string()),
            ..Default::default()
        };
        storage.update(created.id, update).await.unwrap();

        storage.reload().await.unwrap();

        let after_reload = storage.get(created.id).await.unwrap().unwrap();
        assert_eq!(after_reload.title, "Original Title");
    }

    #[tokio::test]
    async fn test_jsonl_reload_missing_file_resets() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("incidents.jsonl");

        let storage = create_storage(StorageBackend::Jsonl(path.clone()), StoreSettings::default())
            .await
            .unwrap();
        let created = storage.create(new_incident("Test")).await.unwrap();
        storage.save().await.unwrap();

        std::fs::remove_file(&path).unwrap();
        storage.reload().await.unwrap();

        assert!(storage.get(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_jsonl_counter_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("incidents.jsonl");

        let first = create_storage(StorageBackend::Jsonl(path.clone()), StoreSettings::default())
            .await
            .unwrap();
        first.create(new_incident("One")).await.unwrap();
        first.create(new_incident("Two")).await.unwrap();
        first.save().await.unwrap();

        let second = create_storage(StorageBackend::Jsonl(path), StoreSettings::default())
            .await
            .unwrap();
        let third = second.create(new_incident("Three")).await.unwrap();
        assert_eq!(third.id, IncidentId::new(2002));
    }

    #[tokio::test]
    async fn test_in_memory_reload_is_noop() {
        let storage = create_storage(StorageBackend::InMemory, StoreSettings::default())
            .await
            .unwrap();
        let created = storage.create(new_incident("Test")).await.unwrap();

        storage.reload().await.unwrap();

        assert!(storage.get(created.id).await.unwrap().is_some());
    }

    #[test]
    fn test_data_path() {
        assert!(StorageBackend::InMemory.data_path().is_none());
        let path = PathBuf::from("/tmp/x.jsonl");
        assert_eq!(
            StorageBackend::Jsonl(path.clone()).data_path(),
            Some(path.as_path())
        );
    }
}
