//! Participant reconciliation between an incident and its chat channel.
//!
//! [`ParticipantSync::reconcile`] merges the channel's membership into the
//! incident's participant set. The merge is purely additive: people who left
//! the channel stay participants. Reconciliation is throttled per incident
//! through `participants_last_synced_at`, so repeated detail-page loads do not
//! hammer the directory.
//!
//! Failures are reported, not raised. A missing link, an unparsable URL, or a
//! directory failure produces a [`SyncResult`] with one error and nothing
//! added. A member that cannot be resolved adds one error and is skipped
//! while the rest are still merged. Store writes after that point are
//! reported the same way. Only reading the incident (including an unknown
//! incident) can surface as `Err`.

use crate::directory::{with_timeout, ChannelId, DirectoryAdapter};
use crate::domain::{Incident, IncidentId, LinkType, UserId};
use crate::error::{Error, Result};
use crate::storage::IncidentStorage;
use crate::users::UserResolver;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reconciliation settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum time between two non-forced reconciliations of an incident
    pub throttle_window: Duration,

    /// Link type holding the incident's channel URL
    pub channel_link: LinkType,

    /// Member ids starting with this prefix are bots and are ignored
    pub bot_id_prefix: String,

    /// Timeout for each directory call
    pub adapter_timeout: Duration,

    /// Prefix for incident keys in channel topics
    pub incident_prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            throttle_window: Duration::from_secs(300),
            channel_link: LinkType::SlackChannel,
            bot_id_prefix: "B".to_string(),
            adapter_timeout: Duration::from_secs(10),
            incident_prefix: "INC".to_string(),
        }
    }
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// Users newly added as participants
    pub added: usize,

    /// Channel members who were already participants
    pub already_existed: usize,

    /// One message per failure
    pub errors: Vec<String>,

    /// The throttle window had not elapsed; nothing was done
    pub skipped: bool,
}

impl SyncResult {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    fn failed(error: String) -> Self {
        Self {
            errors: vec![error],
            ..Default::default()
        }
    }

    /// Whether the reconciliation ran and hit no errors.
    pub fn is_clean(&self) -> bool {
        !self.skipped && self.errors.is_empty()
    }
}

/// Channel-to-incident reconciliation engine.
pub struct ParticipantSync {
    store: Arc<dyn IncidentStorage>,
    directory: Arc<dyn DirectoryAdapter>,
    resolver: UserResolver,
    config: SyncConfig,
}

impl ParticipantSync {
    /// Create an engine. The resolver should share the same store and
    /// directory.
    pub fn new(
        store: Arc<dyn IncidentStorage>,
        directory: Arc<dyn DirectoryAdapter>,
        resolver: UserResolver,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            directory,
            resolver,
            config,
        }
    }

    /// Settings in use.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Merge the linked channel's members into the incident's participants.
    ///
    /// With `force` false, returns a skipped result without touching the
    /// directory if the incident was reconciled within the throttle window.
    ///
    /// # Errors
    ///
    /// - `Error::IncidentNotFound` if the incident doesn't exist
    /// - any store error while reading the incident
    pub async fn reconcile(&self, id: IncidentId, force: bool) -> Result<SyncResult> {
        let incident = self
            .store
            .get(id)
            .await?
            .ok_or(Error::IncidentNotFound(id))?;
        let key = incident.key(&self.config.incident_prefix);

        if !force && self.within_throttle(&incident) {
            debug!(incident = %key, "Participant sync throttled");
            return Ok(SyncResult::skipped());
        }

        let channel = match self.channel_for(&incident) {
            Ok(channel) => channel,
            Err(message) => {
                debug!(incident = %key, %message, "Participant sync not possible");
                return Ok(SyncResult::failed(message));
            }
        };

        let members = match with_timeout(
            self.config.adapter_timeout,
            self.directory.list_channel_members(&channel),
        )
        .await
        {
            Ok(members) => members,
            Err(e) => {
                warn!(incident = %key, %channel, error = %e, "Failed to list channel members");
                return Ok(SyncResult::failed(format!(
                    "failed to list members of channel {channel}: {e}"
                )));
            }
        };

        let mut result = SyncResult::default();
        let humans: Vec<String> = {
            let mut seen = BTreeSet::new();
            members
                .into_iter()
                .filter(|m| !m.starts_with(&self.config.bot_id_prefix))
                .filter(|m| seen.insert(m.clone()))
                .collect()
        };

        let resolved = join_all(
            humans
                .iter()
                .map(|member| self.resolver.resolve_by_chat_id(member)),
        )
        .await;

        let mut new_participants: BTreeSet<UserId> = BTreeSet::new();
        for (member, outcome) in humans.iter().zip(resolved) {
            match outcome {
                Ok(user) => {
                    if incident.participants.contains(&user.id) || !new_participants.insert(user.id)
                    {
                        result.already_existed += 1;
                    }
                }
                Err(e) => {
                    warn!(incident = %key, member = %member, error = %e, "Failed to resolve channel member");
                    result.errors.push(format!("{member}: {e}"));
                }
            }
        }

        if !new_participants.is_empty() {
            let batch: Vec<UserId> = new_participants.into_iter().collect();
            match self.store.add_participants(id, &batch).await {
                Ok(outcome) => {
                    // Another reconcile may have added some of them meanwhile
                    result.added = outcome.added;
                    result.already_existed += batch.len() - outcome.added;
                }
                Err(e) => {
                    warn!(incident = %key, error = %e, "Failed to add participants");
                    result.errors.push(format!("failed to add participants: {e}"));
                }
            }
        }

        if let Err(e) = self.store.mark_participants_synced(id, Utc::now()).await {
            warn!(incident = %key, error = %e, "Failed to record participant sync time");
            result.errors.push(format!("failed to record sync time: {e}"));
        }

        info!(
            incident = %key,
            added = result.added,
            already_existed = result.already_existed,
            errors = result.errors.len(),
            "Participants reconciled"
        );
        Ok(result)
    }

    /// Reconcile several incidents concurrently.
    ///
    /// Results are returned in input order; one incident failing does not
    /// affect the others.
    pub async fn reconcile_many(
        &self,
        ids: &[IncidentId],
        force: bool,
    ) -> Vec<(IncidentId, Result<SyncResult>)> {
        let outcomes = join_all(ids.iter().map(|id| self.reconcile(*id, force))).await;
        ids.iter().copied().zip(outcomes).collect()
    }

    /// Set the linked channel's topic to a one-line incident summary:
    /// `INC-2000 | P1 | active | Captain: alice`.
    ///
    /// Returns `Ok(false)` if the incident has no usable channel link or the
    /// directory rejects or fails the update.
    ///
    /// # Errors
    ///
    /// - `Error::IncidentNotFound` if the incident doesn't exist
    pub async fn publish_topic(&self, id: IncidentId) -> Result<bool> {
        let incident = self
            .store
            .get(id)
            .await?
            .ok_or(Error::IncidentNotFound(id))?;
        let key = incident.key(&self.config.incident_prefix);

        let channel = match self.channel_for(&incident) {
            Ok(channel) => channel,
            Err(message) => {
                debug!(incident = %key, %message, "No channel to publish topic to");
                return Ok(false);
            }
        };

        let captain = match incident.captain {
            Some(captain) => self
                .store
                .get_user(captain)
                .await?
                .map_or_else(|| "unknown".to_string(), |u| u.name()),
            None => "unassigned".to_string(),
        };
        let topic = format!(
            "{key} | {} | {} | Captain: {captain}",
            incident.severity, incident.status
        );

        match with_timeout(
            self.config.adapter_timeout,
            self.directory.update_channel_topic(&channel, &topic),
        )
        .await
        {
            Ok(updated) => Ok(updated),
            Err(e) => {
                warn!(incident = %key, %channel, error = %e, "Failed to update channel topic");
                Ok(false)
            }
        }
    }

    fn within_throttle(&self, incident: &Incident) -> bool {
        let Some(last) = incident.participants_last_synced_at else {
            return false;
        };
        // A timestamp in the future reads as "not synced recently"
        (Utc::now() - last)
            .to_std()
            .is_ok_and(|elapsed| elapsed < self.config.throttle_window)
    }

    fn channel_for(&self, incident: &Incident) -> std::result::Result<ChannelId, String> {
        let link_type = self.config.channel_link;
        let url = incident.external_link(link_type).ok_or_else(|| {
            format!(
                "incident {} has no {link_type} link",
                incident.key(&self.config.incident_prefix)
            )
        })?;
        self.directory
            .parse_channel_id(url)
            .ok_or_else(|| format!("cannot parse a channel id from '{url}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryCall, DirectoryUser, StaticDirectory};
    use crate::domain::{
        IdentityLink, IdentityType, IncidentFilter, IncidentUpdate, NewIncident, NewUser,
        ProfileUpdate, Severity, Tag, TagKind, User,
    };
    use crate::error::StorageError;
    use crate::storage::in_memory::InMemoryStore;
    use crate::storage::{ParticipantsAdded, StoreSettings, StoreSnapshot};

    const CHANNEL_URL: &str = "https://acme.slack.com/archives/C0INC";

    struct Fixture {
        store: Arc<InMemoryStore>,
        directory: StaticDirectory,
        sync: ParticipantSync,
    }

    fn fixture(directory: StaticDirectory) -> Fixture {
        let store = Arc::new(InMemoryStore::new(StoreSettings::default()));
        let adapter: Arc<dyn DirectoryAdapter> = Arc::new(directory.clone());
        let resolver = UserResolver::new(store.clone(), adapter.clone());
        let sync = ParticipantSync::new(store.clone(), adapter, resolver, SyncConfig::default());
        Fixture {
            store,
            directory,
            sync,
        }
    }

    async fn linked_incident(store: &InMemoryStore) -> IncidentId {
        let incident = store
            .create(NewIncident {
                title: "Checkout errors".to_string(),
                severity: Some(Severity::P1),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .set_external_link(incident.id, LinkType::SlackChannel, CHANNEL_URL)
            .await
            .unwrap();
        incident.id
    }

    fn directory() -> StaticDirectory {
        StaticDirectory::new()
            .with_user(DirectoryUser::new("U1", "one@example.com"))
            .with_user(DirectoryUser::new("U2", "two@example.com"))
            .with_channel("C0INC", &["U1", "U2", "B0BOT"])
    }

    #[tokio::test]
    async fn test_bots_are_ignored() {
        let f = fixture(directory());
        let id = linked_incident(&f.store).await;

        let result = f.sync.reconcile(id, true).await.unwrap();
        assert_eq!(result.added, 2);
        assert!(result.errors.is_empty());
        assert!(!f
            .directory
            .calls()
            .contains(&DirectoryCall::LookupById("B0BOT".to_string())));
    }

    #[tokio::test]
    async fn test_missing_link_reports_error_without_sync_stamp() {
        let f = fixture(directory());
        let incident = f
            .store
            .create(NewIncident {
                title: "No channel".to_string(),
                severity: Some(Severity::P3),
                ..Default::default()
            })
            .await
            .unwrap();

        let result = f.sync.reconcile(incident.id, false).await.unwrap();
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("slack_channel"));
        assert_eq!(f.directory.call_count(), 0);

        let stored = f.store.get(incident.id).await.unwrap().unwrap();
        assert!(stored.participants_last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_unparsable_link() {
        let f = fixture(directory());
        let id = linked_incident(&f.store).await;
        f.store
            .set_external_link(id, LinkType::SlackChannel, "https://example.com/chat")
            .await
            .unwrap();

        let result = f.sync.reconcile(id, true).await.unwrap();
        assert_eq!(result.added, 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(f.directory.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_incident_is_an_error() {
        let f = fixture(directory());
        assert!(matches!(
            f.sync.reconcile(IncidentId::new(9999), true).await,
            Err(Error::IncidentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_throttle_allows_sync() {
        let f = fixture(directory());
        let id = linked_incident(&f.store).await;
        let long_ago = Utc::now() - chrono::Duration::hours(1);
        f.store.mark_participants_synced(id, long_ago).await.unwrap();

        let result = f.sync.reconcile(id, false).await.unwrap();
        assert!(!result.skipped);
        assert_eq!(result.added, 2);
    }

    #[tokio::test]
    async fn test_publish_topic() {
        let f = fixture(directory());
        let id = linked_incident(&f.store).await;
        let captain = f
            .store
            .insert_user(NewUser {
                display_name: "alice".to_string(),
                ..NewUser::with_email("alice@example.com")
            })
            .await
            .unwrap();
        f.store
            .update(
                id,
                IncidentUpdate {
                    captain: Some(Some(captain.id)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(f.sync.publish_topic(id).await.unwrap());
        assert_eq!(
            f.directory.topic("C0INC").as_deref(),
            Some("INC-2000 | P1 | active | Captain: alice")
        );
    }

    #[tokio::test]
    async fn test_publish_topic_without_link() {
        let f = fixture(directory());
        let incident = f
            .store
            .create(NewIncident {
                title: "x".to_string(),
                severity: Some(Severity::P4),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!f.sync.publish_topic(incident.id).await.unwrap());
    }

    /// Store whose sync-time writes always fail.
    struct StampFailingStore(InMemoryStore);

    #[async_trait::async_trait]
    impl IncidentStorage for StampFailingStore {
        async fn create(&self, incident: NewIncident) -> Result<Incident> {
            self.0.create(incident).await
        }

        async fn get(&self, id: IncidentId) -> Result<Option<Incident>> {
            self.0.get(id).await
        }

        async fn update(&self, id: IncidentId, updates: IncidentUpdate) -> Result<Incident> {
            self.0.update(id, updates).await
        }

        async fn list(&self, filter: &IncidentFilter) -> Result<Vec<Incident>> {
            self.0.list(filter).await
        }

        async fn set_external_link(
            &self,
            id: IncidentId,
            link_type: LinkType,
            url: &str,
        ) -> Result<Incident> {
            self.0.set_external_link(id, link_type, url).await
        }

        async fn remove_external_link(
            &self,
            id: IncidentId,
            link_type: LinkType,
        ) -> Result<Incident> {
            self.0.remove_external_link(id, link_type).await
        }

        async fn add_participants(
            &self,
            id: IncidentId,
            users: &[UserId],
        ) -> Result<ParticipantsAdded> {
            self.0.add_participants(id, users).await
        }

        async fn mark_participants_synced(
            &self,
            _id: IncidentId,
            _at: chrono::DateTime<Utc>,
        ) -> Result<Incident> {
            Err(StorageError::InvalidFormat("read-only".to_string()).into())
        }

        async fn add_tag(&self, id: IncidentId, kind: TagKind, name: &str) -> Result<Incident> {
            self.0.add_tag(id, kind, name).await
        }

        async fn list_tags(&self, kind: Option<TagKind>) -> Result<Vec<Tag>> {
            self.0.list_tags(kind).await
        }

        async fn get_user(&self, id: UserId) -> Result<Option<User>> {
            self.0.get_user(id).await
        }

        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
            self.0.find_user_by_email(email).await
        }

        async fn find_user_by_identity(
            &self,
            identity_type: IdentityType,
            external_id: &str,
        ) -> Result<Option<User>> {
            self.0.find_user_by_identity(identity_type, external_id).await
        }

        async fn insert_user(&self, user: NewUser) -> Result<User> {
            self.0.insert_user(user).await
        }

        async fn attach_identity(&self, id: UserId, link: IdentityLink) -> Result<User> {
            self.0.attach_identity(id, link).await
        }

        async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User> {
            self.0.update_profile(id, update).await
        }

        async fn list_users(&self) -> Result<Vec<User>> {
            self.0.list_users().await
        }

        async fn import(&self, snapshot: StoreSnapshot) -> Result<()> {
            self.0.import(snapshot).await
        }

        async fn export_all(&self) -> Result<StoreSnapshot> {
            self.0.export_all().await
        }

        async fn save(&self) -> Result<()> {
            self.0.save().await
        }

        async fn reload(&self) -> Result<()> {
            self.0.reload().await
        }
    }

    #[tokio::test]
    async fn test_sync_time_failure_keeps_partial_progress() {
        let store = InMemoryStore::new(StoreSettings::default());
        let id = linked_incident(&store).await;
        let store: Arc<dyn IncidentStorage> = Arc::new(StampFailingStore(store));
        let adapter: Arc<dyn DirectoryAdapter> = Arc::new(directory());
        let resolver = UserResolver::new(store.clone(), adapter.clone());
        let sync = ParticipantSync::new(store.clone(), adapter, resolver, SyncConfig::default());

        let result = sync.reconcile(id, false).await.unwrap();

        assert_eq!(result.added, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("sync time"));
        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.participants.len(), 2);
        assert!(stored.participants_last_synced_at.is_none());
    }

    #[test]
    fn test_is_clean() {
        assert!(SyncResult::default().is_clean());
        assert!(!SyncResult::skipped().is_clean());
        assert!(!SyncResult::failed("x".to_string()).is_clean());
    }
}
