//! Core in-memory storage data structures.
//!
//! This module contains the inner storage structure that holds all data
//! and is wrapped in `Arc<Mutex<>>` for thread safety.

use crate::domain::{
    normalize_email, IdentityLink, IdentityType, Incident, IncidentId, Tag, TagId, TagKind, User,
    UserId,
};
use crate::error::{Error, Result, StorageError, ValidationError};
use crate::id_allocation::{CounterStorage, IdCounterState};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Inner storage structure (not thread-safe).
///
/// The index maps must always agree with the primary maps: every user's
/// email and identity links appear in `email_index` / `identity_index`, and
/// every tag's unique key appears in `tag_index`.
#[derive(Debug, Clone, Default)]
pub(crate) struct InMemoryStorageInner {
    /// Incidents ordered by ID
    pub(super) incidents: BTreeMap<IncidentId, Incident>,

    /// Users ordered by ID
    pub(super) users: BTreeMap<UserId, User>,

    /// Lower-cased email to user
    pub(super) email_index: HashMap<String, UserId>,

    /// External identity to user
    pub(super) identity_index: HashMap<(IdentityType, String), UserId>,

    /// Tags ordered by ID
    pub(super) tags: BTreeMap<TagId, Tag>,

    /// `(kind, lower-cased name)` to tag
    pub(super) tag_index: HashMap<(TagKind, String), TagId>,

    /// The ID counter row; `None` until first use or after a lossy import
    pub(super) counter: Option<IdCounterState>,

    next_user_id: u64,
    next_tag_id: u64,
}

impl InMemoryStorageInner {
    /// Create a new empty storage instance
    pub(crate) fn new() -> Self {
        Self {
            next_user_id: 1,
            next_tag_id: 1,
            ..Default::default()
        }
    }

    /// Start a counter transaction. Dropping it without calling
    /// [`CounterTransaction::commit`] restores the counter.
    pub(super) fn counter_transaction(&mut self) -> CounterTransaction<'_> {
        let saved = self.counter;
        CounterTransaction {
            inner: self,
            saved,
            committed: false,
        }
    }

    pub(super) fn allocate_user_id(&mut self) -> UserId {
        let id = UserId::new(self.next_user_id);
        self.next_user_id += 1;
        id
    }

    pub(super) fn user_exists(&self, id: UserId) -> bool {
        self.users.contains_key(&id)
    }

    /// First user referenced by the incident that does not exist.
    pub(super) fn missing_user(&self, incident: &Incident) -> Option<UserId> {
        incident
            .captain
            .into_iter()
            .chain(incident.reporter)
            .chain(incident.participants.iter().copied())
            .find(|id| !self.user_exists(*id))
    }

    /// First tag referenced by the incident that does not exist.
    pub(super) fn missing_tag(&self, incident: &Incident) -> Option<TagId> {
        [TagKind::AffectedService, TagKind::RootCause, TagKind::ImpactType]
            .into_iter()
            .flat_map(|kind| incident.tags(kind).iter().copied())
            .find(|id| !self.tags.contains_key(id))
    }

    /// Check that a user record would not violate any unique key.
    pub(super) fn check_user_unique(&self, user: &User) -> std::result::Result<(), StorageError> {
        if let Some(owner) = self.email_index.get(&user.email) {
            if *owner != user.id {
                return Err(StorageError::UniqueViolation {
                    constraint: "users_email_key",
                    value: user.email.clone(),
                });
            }
        }
        for link in &user.identities {
            self.check_identity_unique(user.id, link)?;
        }
        Ok(())
    }

    /// Check that `link` can belong to `user`.
    ///
    /// Returns `Ok(true)` if the user already owns exactly this link.
    pub(super) fn check_identity_unique(
        &self,
        user: UserId,
        link: &IdentityLink,
    ) -> std::result::Result<bool, StorageError> {
        let key = (link.identity_type, link.external_id.clone());
        match self.identity_index.get(&key) {
            Some(owner) if *owner == user => return Ok(true),
            Some(_) => {
                return Err(StorageError::UniqueViolation {
                    constraint: "identity_external_id_key",
                    value: format!("{}:{}", link.identity_type, link.external_id),
                });
            }
            None => {}
        }
        let has_other = self.users.get(&user).is_some_and(|u| {
            u.identities
                .iter()
                .any(|l| l.identity_type == link.identity_type && l.external_id != link.external_id)
        });
        if has_other {
            return Err(StorageError::UniqueViolation {
                constraint: "identity_user_type_key",
                value: format!("{user}:{}", link.identity_type),
            });
        }
        Ok(false)
    }

    /// Lower-case a stored user's email so it matches `email_index` lookups.
    pub(super) fn normalized_user(mut user: User) -> std::result::Result<User, ValidationError> {
        user.email = normalize_email(&user.email)?;
        Ok(user)
    }

    /// Store a user and index it. Callers must have run
    /// [`Self::check_user_unique`].
    pub(super) fn put_user(&mut self, user: User) {
        if let Some(previous) = self.users.get(&user.id) {
            self.email_index.remove(&previous.email);
            for link in &previous.identities {
                self.identity_index
                    .remove(&(link.identity_type, link.external_id.clone()));
            }
        }
        self.email_index.insert(user.email.clone(), user.id);
        for link in &user.identities {
            self.identity_index
                .insert((link.identity_type, link.external_id.clone()), user.id);
        }
        self.next_user_id = self.next_user_id.max(user.id.as_u64() + 1);
        self.users.insert(user.id, user);
    }

    /// Find or create the tag with this kind and name.
    pub(super) fn get_or_create_tag(&mut self, kind: TagKind, name: String) -> TagId {
        let key = (kind, name.to_lowercase());
        if let Some(id) = self.tag_index.get(&key) {
            return *id;
        }
        let id = TagId::new(self.next_tag_id);
        self.next_tag_id += 1;
        debug!(tag_id = %id, ?kind, %name, "Created tag");
        self.tag_index.insert(key, id);
        self.tags.insert(id, Tag { id, kind, name });
        id
    }

    /// Store an imported tag, rejecting a second tag with the same key.
    pub(super) fn put_tag(&mut self, tag: Tag) -> std::result::Result<(), StorageError> {
        let key = tag.unique_key();
        if let Some(existing) = self.tag_index.get(&key) {
            if *existing != tag.id {
                return Err(StorageError::UniqueViolation {
                    constraint: "tag_kind_name_key",
                    value: tag.name,
                });
            }
        }
        self.next_tag_id = self.next_tag_id.max(tag.id.as_u64() + 1);
        self.tag_index.insert(key, tag.id);
        self.tags.insert(tag.id, tag);
        Ok(())
    }

    pub(super) fn incident_mut(&mut self, id: IncidentId) -> Result<&mut Incident> {
        self.incidents
            .get_mut(&id)
            .ok_or(Error::IncidentNotFound(id))
    }
}

/// The counter row plus the incidents table, opened for one `create`.
///
/// Restores the counter to its starting value on drop unless committed,
/// which is what makes a failed create leave no gap.
pub(super) struct CounterTransaction<'a> {
    inner: &'a mut InMemoryStorageInner,
    saved: Option<IdCounterState>,
    committed: bool,
}

impl CounterTransaction<'_> {
    /// Read access to the rest of the store.
    pub(super) fn store(&self) -> &InMemoryStorageInner {
        self.inner
    }

    /// Persist the incident and keep the advanced counter.
    pub(super) fn commit(mut self, incident: Incident) {
        self.inner.incidents.insert(incident.id, incident);
        self.committed = true;
    }
}

impl Drop for CounterTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed && self.inner.counter != self.saved {
            debug!(restored = ?self.saved, "Rolled back ID counter");
            self.inner.counter = self.saved;
        }
    }
}

impl CounterStorage for CounterTransaction<'_> {
    fn counter_for_update(&mut self) -> Option<&mut IdCounterState> {
        self.inner.counter.as_mut()
    }

    fn get_or_create_counter(&mut self, next_id: u64) -> bool {
        if self.inner.counter.is_some() {
            return false;
        }
        self.inner.counter = Some(IdCounterState { next_id });
        true
    }

    fn max_incident_id(&self) -> Option<u64> {
        self.inner
            .incidents
            .keys()
            .next_back()
            .map(|id| id.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_allocation::IdAllocator;
    use chrono::Utc;

    fn user(id: u64, email: &str) -> User {
        User {
            id: UserId::new(id),
            email: email.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            display_name: String::new(),
            avatar_url: None,
            is_superuser: false,
            password_usable: false,
            identities: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_uncommitted_transaction_restores_counter() {
        let mut inner = InMemoryStorageInner::new();
        inner.counter = Some(IdCounterState { next_id: 2005 });

        {
            let mut txn = inner.counter_transaction();
            let id = IdAllocator::new(2000).allocate(&mut txn).unwrap();
            assert_eq!(id.as_u64(), 2005);
        }

        assert_eq!(inner.counter, Some(IdCounterState { next_id: 2005 }));
    }

    #[test]
    fn test_rollback_removes_recreated_counter() {
        let mut inner = InMemoryStorageInner::new();
        {
            let mut txn = inner.counter_transaction();
            IdAllocator::new(2000).allocate(&mut txn).unwrap();
        }
        assert_eq!(inner.counter, None);
    }

    #[test]
    fn test_email_uniqueness() {
        let mut inner = InMemoryStorageInner::new();
        inner.put_user(user(1, "a@example.com"));

        let err = inner.check_user_unique(&user(2, "a@example.com")).unwrap_err();
        assert!(err.is_unique_violation());
        assert!(inner.check_user_unique(&user(1, "a@example.com")).is_ok());
    }

    #[test]
    fn test_identity_uniqueness() {
        let mut inner = InMemoryStorageInner::new();
        let mut alice = user(1, "a@example.com");
        alice.identities.push(IdentityLink::new(IdentityType::Chat, "U1"));
        inner.put_user(alice);
        inner.put_user(user(2, "b@example.com"));

        let same = IdentityLink::new(IdentityType::Chat, "U1");
        assert!(inner.check_identity_unique(UserId::new(1), &same).unwrap());
        assert!(inner.check_identity_unique(UserId::new(2), &same).is_err());

        let other = IdentityLink::new(IdentityType::Chat, "U9");
        assert!(inner.check_identity_unique(UserId::new(1), &other).is_err());
        assert!(!inner.check_identity_unique(UserId::new(2), &other).unwrap());
    }

    #[test]
    fn test_tags_are_case_insensitive_per_kind() {
        let mut inner = InMemoryStorageInner::new();
        let a = inner.get_or_create_tag(TagKind::RootCause, "Bad Deploy".to_string());
        let b = inner.get_or_create_tag(TagKind::RootCause, "bad deploy".to_string());
        let c = inner.get_or_create_tag(TagKind::ImpactType, "bad deploy".to_string());

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(inner.tags[&a].name, "Bad Deploy");
    }

    #[test]
    fn test_put_user_tracks_next_id() {
        let mut inner = InMemoryStorageInner::new();
        inner.put_user(user(41, "x@example.com"));
        assert_eq!(inner.allocate_user_id(), UserId::new(42));
    }
}
