//! Resolution of external identities to canonical local users.
//!
//! Three entry points map an email, a chat user id, or an SSO subject to a
//! [`User`], creating the user when none exists. All of them share the same
//! rules:
//!
//! 1. An existing identity link of the relevant type wins.
//! 2. Otherwise a user with the same email gets the new link attached.
//! 3. Otherwise a new user is created, keyed by email, with login disabled.
//!
//! Profile data (names, avatar) is fetched from the directory on a best-effort
//! basis. A directory that is down or slow never blocks resolution: a stub
//! user is created instead and can be enriched later.
//!
//! Two callers resolving the same new email at the same time converge on a
//! single user: the loser of the insert race sees a unique violation and
//! re-fetches the winner's row.

use crate::directory::{with_timeout, DirectoryAdapter, DirectoryProfile};
use crate::domain::{normalize_email, IdentityLink, IdentityType, NewUser, ProfileUpdate, User};
use crate::error::{Error, ResolutionError};
use crate::storage::IncidentStorage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-call directory timeout.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default domain for emails synthesized for chat users without one.
pub const DEFAULT_STUB_EMAIL_DOMAIN: &str = "chat.invalid";

type ResolveResult = std::result::Result<User, ResolutionError>;

/// Maps external identities to local users.
#[derive(Clone)]
pub struct UserResolver {
    store: Arc<dyn IncidentStorage>,
    directory: Arc<dyn DirectoryAdapter>,
    lookup_timeout: Duration,
    stub_email_domain: String,
}

impl UserResolver {
    /// Create a resolver with default timeout and stub domain.
    pub fn new(store: Arc<dyn IncidentStorage>, directory: Arc<dyn DirectoryAdapter>) -> Self {
        Self {
            store,
            directory,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            stub_email_domain: DEFAULT_STUB_EMAIL_DOMAIN.to_string(),
        }
    }

    /// Set the per-call directory timeout.
    #[must_use]
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Set the domain used for synthesized emails.
    #[must_use]
    pub fn with_stub_email_domain(mut self, domain: impl Into<String>) -> Self {
        self.stub_email_domain = domain.into();
        self
    }

    /// Resolve a user by email, creating one if needed.
    ///
    /// # Errors
    ///
    /// - [`ResolutionError::InvalidEmail`] if the email is unusable
    /// - [`ResolutionError::Store`] if the store fails
    pub async fn resolve_by_email(&self, email: &str) -> ResolveResult {
        let email =
            normalize_email(email).map_err(|_| ResolutionError::InvalidEmail(email.to_string()))?;

        if let Some(user) = self.store.find_user_by_email(&email).await? {
            return Ok(user);
        }

        let profile = self.lookup_by_email(&email).await;
        let user = self.get_or_create(&email, profile.as_ref()).await?;

        match profile.and_then(|p| p.external_id) {
            Some(external_id) => {
                self.attach_if_unclaimed(user, IdentityLink::new(IdentityType::Chat, external_id))
                    .await
            }
            None => Ok(user),
        }
    }

    /// Resolve a chat user id, creating the user if needed.
    ///
    /// When the directory is unreachable the user is created with a stub
    /// email `{id}@{stub domain}`.
    ///
    /// # Errors
    ///
    /// - [`ResolutionError::UnknownChatUser`] if the directory answers that
    ///   no such user exists
    /// - [`ResolutionError::Store`] if the store fails
    pub async fn resolve_by_chat_id(&self, external_id: &str) -> ResolveResult {
        if let Some(user) = self
            .store
            .find_user_by_identity(IdentityType::Chat, external_id)
            .await?
        {
            return Ok(user);
        }

        let lookup = with_timeout(
            self.lookup_timeout,
            self.directory.lookup_user_by_id(external_id),
        )
        .await;
        let profile = match lookup {
            Ok(Some(profile)) => Some(profile),
            Ok(None) => return Err(ResolutionError::UnknownChatUser(external_id.to_string())),
            Err(e) => {
                warn!(external_id, error = %e, "Directory lookup failed, creating stub user");
                None
            }
        };

        let email = match profile
            .as_ref()
            .and_then(|p| p.email.as_deref())
            .and_then(|e| normalize_email(e).ok())
        {
            Some(email) => email,
            None => self.stub_email(external_id)?,
        };

        let user = self.get_or_create(&email, profile.as_ref()).await?;
        self.link_identity(user, IdentityLink::new(IdentityType::Chat, external_id))
            .await
    }

    /// Resolve an SSO subject and email pair, creating the user if needed.
    ///
    /// # Errors
    ///
    /// - [`ResolutionError::InvalidEmail`] if the email is unusable
    /// - [`ResolutionError::Store`] if the store fails
    pub async fn resolve_by_sso(&self, subject: &str, email: &str) -> ResolveResult {
        if let Some(user) = self
            .store
            .find_user_by_identity(IdentityType::Sso, subject)
            .await?
        {
            return Ok(user);
        }

        let email =
            normalize_email(email).map_err(|_| ResolutionError::InvalidEmail(email.to_string()))?;
        let user = match self.store.find_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                let profile = self.lookup_by_email(&email).await;
                self.get_or_create(&email, profile.as_ref()).await?
            }
        };
        self.link_identity(user, IdentityLink::new(IdentityType::Sso, subject))
            .await
    }

    async fn lookup_by_email(&self, email: &str) -> Option<DirectoryProfile> {
        match with_timeout(self.lookup_timeout, self.directory.lookup_user_by_email(email)).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(email, error = %e, "Directory lookup failed, continuing without profile");
                None
            }
        }
    }

    fn stub_email(&self, external_id: &str) -> std::result::Result<String, ResolutionError> {
        let candidate = format!("{external_id}@{}", self.stub_email_domain);
        normalize_email(&candidate).map_err(|_| ResolutionError::InvalidEmail(candidate))
    }

    /// Fetch the user with this email, or create it from the profile.
    async fn get_or_create(&self, email: &str, profile: Option<&DirectoryProfile>) -> ResolveResult {
        if let Some(user) = self.store.find_user_by_email(email).await? {
            return self.enrich(user, profile).await;
        }

        let mut new_user = NewUser::with_email(email);
        if let Some(profile) = profile {
            new_user.first_name = profile.first_name.clone().unwrap_or_default();
            new_user.last_name = profile.last_name.clone().unwrap_or_default();
            new_user.display_name = profile.display_name.clone().unwrap_or_default();
            new_user.avatar_url = profile.avatar_url.clone();
        }

        match self.store.insert_user(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, email, stub = profile.is_none(), "Resolved new user");
                Ok(user)
            }
            Err(Error::Storage(e)) if e.is_unique_violation() => {
                debug!(email, "Lost user creation race, re-fetching");
                self.store
                    .find_user_by_email(email)
                    .await?
                    .ok_or_else(|| Error::Storage(e).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fill an empty profile from directory data.
    async fn enrich(&self, user: User, profile: Option<&DirectoryProfile>) -> ResolveResult {
        let Some(profile) = profile.filter(|_| user.has_empty_profile()) else {
            return Ok(user);
        };
        let update = ProfileUpdate {
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
        };
        if update.is_empty() {
            return Ok(user);
        }
        Ok(self.store.update_profile(user.id, update).await?)
    }

    /// Attach `link` unless the user already has one of that type or another
    /// user owns it. Returns `user` either way.
    async fn attach_if_unclaimed(&self, user: User, link: IdentityLink) -> ResolveResult {
        if user.identity(link.identity_type).is_some() {
            return Ok(user);
        }
        match self.store.attach_identity(user.id, link.clone()).await {
            Ok(user) => Ok(user),
            Err(Error::Storage(e)) if e.is_unique_violation() => {
                debug!(user_id = %user.id, external_id = %link.external_id, "Identity owned by another user, not linking");
                Ok(user)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Attach `link` to `user`, deferring to whoever owns it already.
    async fn link_identity(&self, user: User, link: IdentityLink) -> ResolveResult {
        if user.identity(link.identity_type) == Some(&link) {
            return Ok(user);
        }
        match self.store.attach_identity(user.id, link.clone()).await {
            Ok(user) => Ok(user),
            Err(Error::Storage(e)) if e.is_unique_violation() => {
                if let Some(owner) = self
                    .store
                    .find_user_by_identity(link.identity_type, &link.external_id)
                    .await?
                {
                    debug!(user_id = %owner.id, external_id = %link.external_id, "Identity already linked");
                    return Ok(owner);
                }
                warn!(
                    user_id = %user.id,
                    identity = %link.identity_type,
                    external_id = %link.external_id,
                    "User already linked to a different identity of this type"
                );
                Ok(user)
            }
            Err(e) => Err(e.into()),
        }
    }
}
