//! IncidentStorage trait implementation for in-memory storage.

use super::inner::InMemoryStorageInner;
use super::InMemoryStore;
use crate::domain::{
    is_secure_absolute_url, normalize_email, IdentityLink, IdentityType, Incident,
    IncidentFilter, IncidentId, IncidentStatus, IncidentUpdate, LinkType, NewIncident, NewUser,
    ProfileUpdate, Tag, TagKind, User, UserId,
};
use crate::duration;
use crate::error::{Error, Result, StorageError, ValidationError};
use crate::storage::{IncidentStorage, ParticipantsAdded, StoreSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Keep an avatar URL only if it is an absolute `https://` URL.
fn sanitize_avatar(user_hint: &str, url: Option<String>) -> Option<String> {
    let url = url?;
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_secure_absolute_url(trimmed) {
        Some(trimmed.to_string())
    } else {
        warn!(user = %user_hint, url = %trimmed, "Dropping non-https avatar URL");
        None
    }
}

fn id_taken(constraint: &'static str, id: impl std::fmt::Display) -> Error {
    StorageError::UniqueViolation {
        constraint,
        value: id.to_string(),
    }
    .into()
}

#[async_trait]
impl IncidentStorage for InMemoryStore {
    async fn create(&self, new_incident: NewIncident) -> Result<Incident> {
        // === Phase 1: Input validation (no mutations) ===
        let (severity, downtime_seconds) = new_incident.validate()?;

        let mut inner = self.lock_for_allocation().await?;

        // === Phase 2: ID allocation inside the counter transaction ===
        let mut txn = inner.counter_transaction();
        let id = self.allocator.allocate(&mut txn)?;

        let now = Utc::now();
        let incident = Incident {
            id,
            title: new_incident.title.trim().to_string(),
            description: new_incident.description,
            status: IncidentStatus::Active,
            severity,
            service_tier: new_incident.service_tier,
            is_private: new_incident.is_private,
            captain: new_incident.captain,
            reporter: new_incident.reporter,
            participants: BTreeSet::new(),
            affected_services: BTreeSet::new(),
            root_causes: BTreeSet::new(),
            impact_types: BTreeSet::new(),
            external_links: Default::default(),
            downtime_seconds,
            participants_last_synced_at: None,
            created_at: now,
            updated_at: now,
            mitigated_at: None,
            closed_at: None,
        };

        // === Phase 3: Referential checks; any error drops `txn` and
        // restores the counter ===
        if let Some(missing) = txn.store().missing_user(&incident) {
            return Err(Error::UserNotFound(missing));
        }
        incident.validate()?;

        // === Phase 4: Persist ===
        txn.commit(incident.clone());
        info!(incident_id = %id, severity = %severity, "Created incident");
        Ok(incident)
    }

    async fn get(&self, id: IncidentId) -> Result<Option<Incident>> {
        Ok(self.lock().await.incidents.get(&id).cloned())
    }

    async fn update(&self, id: IncidentId, updates: IncidentUpdate) -> Result<Incident> {
        let mut inner = self.lock().await;
        let current = inner
            .incidents
            .get(&id)
            .ok_or(Error::IncidentNotFound(id))?;

        // Apply to a copy so a rejected update leaves the stored record untouched
        let mut incident = current.clone();
        let now = Utc::now();

        if let Some(title) = updates.title {
            incident.title = title.trim().to_string();
        }
        if let Some(description) = updates.description {
            incident.description = description;
        }
        if let Some(severity) = updates.severity {
            incident.severity = severity;
        }
        if let Some(service_tier) = updates.service_tier {
            incident.service_tier = service_tier;
        }
        if let Some(is_private) = updates.is_private {
            incident.is_private = is_private;
        }
        if let Some(captain) = updates.captain {
            incident.captain = captain;
        }
        if let Some(reporter) = updates.reporter {
            incident.reporter = reporter;
        }
        if let Some(downtime) = updates.downtime {
            incident.downtime_seconds = downtime
                .as_deref()
                .map(duration::parse)
                .transpose()
                .map_err(ValidationError::from)?;
        }
        if let Some(status) = updates.status {
            incident.transition(status, now);
        }

        incident.validate()?;
        if let Some(missing) = inner.missing_user(&incident) {
            return Err(Error::UserNotFound(missing));
        }

        incident.updated_at = now;
        inner.incidents.insert(id, incident.clone());
        debug!(incident_id = %id, status = %incident.status, "Updated incident");
        Ok(incident)
    }

    async fn list(&self, filter: &IncidentFilter) -> Result<Vec<Incident>> {
        let inner = self.lock().await;
        let matching = inner
            .incidents
            .values()
            .rev()
            .filter(|incident| filter.matches(incident))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matching)
    }

    async fn set_external_link(
        &self,
        id: IncidentId,
        link_type: LinkType,
        url: &str,
    ) -> Result<Incident> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ValidationError::EmptyLinkUrl.into());
        }

        let mut inner = self.lock().await;
        let incident = inner.incident_mut(id)?;
        incident.external_links.insert(link_type, url.to_string());
        incident.updated_at = Utc::now();
        Ok(incident.clone())
    }

    async fn remove_external_link(&self, id: IncidentId, link_type: LinkType) -> Result<Incident> {
        let mut inner = self.lock().await;
        let incident = inner.incident_mut(id)?;
        if incident.external_links.remove(&link_type).is_some() {
            incident.updated_at = Utc::now();
        }
        Ok(incident.clone())
    }

    async fn add_participants(
        &self,
        id: IncidentId,
        users: &[UserId],
    ) -> Result<ParticipantsAdded> {
        let mut inner = self.lock().await;
        if !inner.incidents.contains_key(&id) {
            return Err(Error::IncidentNotFound(id));
        }
        if let Some(missing) = users.iter().find(|u| !inner.user_exists(**u)) {
            return Err(Error::UserNotFound(*missing));
        }

        let incident = inner.incident_mut(id)?;
        let before = incident.participants.len();
        incident.participants.extend(users.iter().copied());
        let added = incident.participants.len() - before;
        if added > 0 {
            incident.updated_at = Utc::now();
            debug!(incident_id = %id, added, "Added participants");
        }
        Ok(ParticipantsAdded {
            incident: incident.clone(),
            added,
        })
    }

    async fn mark_participants_synced(
        &self,
        id: IncidentId,
        at: DateTime<Utc>,
    ) -> Result<Incident> {
        let mut inner = self.lock().await;
        let incident = inner.incident_mut(id)?;
        incident.participants_last_synced_at = Some(at);
        Ok(incident.clone())
    }

    async fn add_tag(&self, id: IncidentId, kind: TagKind, name: &str) -> Result<Incident> {
        let name = Tag::normalize_name(name)?;

        let mut inner = self.lock().await;
        if !inner.incidents.contains_key(&id) {
            return Err(Error::IncidentNotFound(id));
        }
        // Lookup and insert happen under one lock, so two concurrent callers
        // with names differing only in case end up with the same tag.
        let tag_id = inner.get_or_create_tag(kind, name);

        let incident = inner.incident_mut(id)?;
        if incident.tags_mut(kind).insert(tag_id) {
            incident.updated_at = Utc::now();
        }
        Ok(incident.clone())
    }

    async fn list_tags(&self, kind: Option<TagKind>) -> Result<Vec<Tag>> {
        let inner = self.lock().await;
        Ok(inner
            .tags
            .values()
            .filter(|tag| kind.is_none_or(|k| tag.kind == k))
            .cloned()
            .collect())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let key = email.trim().to_lowercase();
        let inner = self.lock().await;
        Ok(inner
            .email_index
            .get(&key)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn find_user_by_identity(
        &self,
        identity_type: IdentityType,
        external_id: &str,
    ) -> Result<Option<User>> {
        let inner = self.lock().await;
        Ok(inner
            .identity_index
            .get(&(identity_type, external_id.to_string()))
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn insert_user(&self, new_user: NewUser) -> Result<User> {
        let email = normalize_email(&new_user.email)?;
        let avatar_url = sanitize_avatar(&email, new_user.avatar_url);

        let mut inner = self.lock().await;
        if inner.email_index.contains_key(&email) {
            return Err(StorageError::UniqueViolation {
                constraint: "users_email_key",
                value: email,
            }
            .into());
        }

        let user = User {
            id: inner.allocate_user_id(),
            email,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            display_name: new_user.display_name,
            avatar_url,
            is_superuser: new_user.is_superuser,
            password_usable: false,
            identities: Vec::new(),
            created_at: Utc::now(),
        };
        inner.put_user(user.clone());
        info!(user_id = %user.id, email = %user.email, "Created user");
        Ok(user)
    }

    async fn attach_identity(&self, id: UserId, link: IdentityLink) -> Result<User> {
        let mut inner = self.lock().await;
        let mut user = inner
            .users
            .get(&id)
            .cloned()
            .ok_or(Error::UserNotFound(id))?;

        if inner.check_identity_unique(id, &link)? {
            return Ok(user);
        }

        debug!(user_id = %id, identity = %link.identity_type, external_id = %link.external_id, "Attached identity");
        user.identities.push(link);
        inner.put_user(user.clone());
        Ok(user)
    }

    async fn update_profile(&self, id: UserId, update: ProfileUpdate) -> Result<User> {
        let mut inner = self.lock().await;
        let mut user = inner
            .users
            .get(&id)
            .cloned()
            .ok_or(Error::UserNotFound(id))?;

        if let Some(first_name) = update.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            user.last_name = last_name;
        }
        if let Some(display_name) = update.display_name {
            user.display_name = display_name;
        }
        if update.avatar_url.is_some() {
            if let Some(url) = sanitize_avatar(&user.email, update.avatar_url) {
                user.avatar_url = Some(url);
            }
        }

        inner.put_user(user.clone());
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.lock().await.users.values().cloned().collect())
    }

    async fn import(&self, snapshot: StoreSnapshot) -> Result<()> {
        let mut inner = self.lock().await;

        // Build the result on a copy so a failed import changes nothing
        let mut staged: InMemoryStorageInner = inner.clone();

        // Existing records are never replaced: incidents point at users and
        // tags by ID
        for tag in snapshot.tags {
            if staged.tags.contains_key(&tag.id) {
                return Err(id_taken("tags_pkey", tag.id));
            }
            staged.put_tag(tag)?;
        }
        for user in snapshot.users {
            if staged.users.contains_key(&user.id) {
                return Err(id_taken("users_pkey", user.id));
            }
            let user = InMemoryStorageInner::normalized_user(user)?;
            staged.check_user_unique(&user)?;
            staged.put_user(user);
        }
        for incident in snapshot.incidents {
            if staged.incidents.contains_key(&incident.id) {
                return Err(id_taken("incidents_pkey", incident.id));
            }
            incident.validate()?;
            if let Some(missing) = staged.missing_user(&incident) {
                return Err(Error::UserNotFound(missing));
            }
            if let Some(missing) = staged.missing_tag(&incident) {
                return Err(StorageError::InvalidFormat(format!(
                    "incident {} references unknown tag {missing}",
                    incident.id
                ))
                .into());
            }
            staged.incidents.insert(incident.id, incident);
        }
        if snapshot.counter.is_some() {
            staged.counter = snapshot.counter;
        }

        *inner = staged;
        Ok(())
    }

    async fn export_all(&self) -> Result<StoreSnapshot> {
        let inner = self.lock().await;
        Ok(StoreSnapshot {
            counter: inner.counter,
            tags: inner.tags.values().cloned().collect(),
            users: inner.users.values().cloned().collect(),
            incidents: inner.incidents.values().cloned().collect(),
        })
    }

    async fn save(&self) -> Result<()> {
        // In-memory storage doesn't persist
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        Ok(())
    }
}
