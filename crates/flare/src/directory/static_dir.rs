//! Directory adapter backed by a fixed snapshot.
//!
//! Used by the CLI (loaded from a YAML file) and by tests, which also use
//! its failure injection and call recording.

use super::{ChannelId, DirectoryAdapter, DirectoryError, DirectoryProfile};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

/// A user entry in a [`DirectorySnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    /// Directory user id
    pub id: String,

    /// Email address
    #[serde(default)]
    pub email: Option<String>,

    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,

    /// Given name
    #[serde(default)]
    pub first_name: Option<String>,

    /// Family name
    #[serde(default)]
    pub last_name: Option<String>,

    /// Avatar URL
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl DirectoryUser {
    /// User with an id and email only.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
            ..Default::default()
        }
    }

    fn profile(&self) -> DirectoryProfile {
        DirectoryProfile {
            external_id: Some(self.id.clone()),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Serializable directory contents.
///
/// ```yaml
/// users:
///   - id: U01
///     email: alice@example.com
///     display_name: alice
/// channels:
///   C0INC2000: [U01, U02, B0BOT]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    /// Known users
    #[serde(default)]
    pub users: Vec<DirectoryUser>,

    /// Channel id to member ids
    #[serde(default)]
    pub channels: BTreeMap<String, Vec<String>>,
}

/// A recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryCall {
    /// `lookup_user_by_email`
    LookupByEmail(String),
    /// `lookup_user_by_id`
    LookupById(String),
    /// `list_channel_members`
    ListMembers(String),
    /// `update_channel_topic`
    UpdateTopic {
        /// Channel id
        channel: String,
        /// Topic text
        text: String,
    },
}

#[derive(Default)]
struct DirectoryState {
    snapshot: DirectorySnapshot,
    failing_channels: HashSet<String>,
    lookups_fail: bool,
    topics: HashMap<String, String>,
    calls: Vec<DirectoryCall>,
}

/// In-process [`DirectoryAdapter`] serving a [`DirectorySnapshot`].
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct StaticDirectory {
    state: Arc<Mutex<DirectoryState>>,
    latency: Option<Duration>,
    lookup_gate: Option<Arc<Barrier>>,
}

impl StaticDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory serving the given snapshot.
    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        let dir = Self::default();
        dir.state.lock().snapshot = snapshot;
        dir
    }

    /// Load a snapshot from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, or a config error if
    /// it is not a valid snapshot.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let snapshot: DirectorySnapshot =
            serde_yaml::from_str(&content).map_err(ConfigError::from)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Add a user.
    #[must_use]
    pub fn with_user(self, user: DirectoryUser) -> Self {
        self.state.lock().snapshot.users.push(user);
        self
    }

    /// Set a channel's members.
    #[must_use]
    pub fn with_channel(self, channel: &str, members: &[&str]) -> Self {
        self.set_channel_members(channel, members);
        self
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make user lookups wait on `gate` before answering.
    #[must_use]
    pub fn with_lookup_gate(mut self, gate: Arc<Barrier>) -> Self {
        self.lookup_gate = Some(gate);
        self
    }

    /// Replace a channel's members.
    pub fn set_channel_members(&self, channel: &str, members: &[&str]) {
        self.state.lock().snapshot.channels.insert(
            channel.to_string(),
            members.iter().map(|m| (*m).to_string()).collect(),
        );
    }

    /// Make member listing fail for a channel.
    pub fn fail_channel(&self, channel: &str) {
        self.state.lock().failing_channels.insert(channel.to_string());
    }

    /// Make every user lookup fail (or succeed again).
    pub fn fail_lookups(&self, fail: bool) {
        self.state.lock().lookups_fail = fail;
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Current topic of a channel.
    pub fn topic(&self, channel: &str) -> Option<String> {
        self.state.lock().topics.get(channel).cloned()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn gate(&self) {
        if let Some(gate) = &self.lookup_gate {
            gate.wait().await;
        }
    }
}

#[async_trait]
impl DirectoryAdapter for StaticDirectory {
    async fn lookup_user_by_email(
        &self,
        email: &str,
    ) -> std::result::Result<Option<DirectoryProfile>, DirectoryError> {
        self.state
            .lock()
            .calls
            .push(DirectoryCall::LookupByEmail(email.to_string()));
        self.gate().await;
        self.delay().await;

        let state = self.state.lock();
        if state.lookups_fail {
            return Err(DirectoryError::Unavailable("lookups disabled".to_string()));
        }
        Ok(state
            .snapshot
            .users
            .iter()
            .find(|u| {
                u.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .map(DirectoryUser::profile))
    }

    async fn lookup_user_by_id(
        &self,
        external_id: &str,
    ) -> std::result::Result<Option<DirectoryProfile>, DirectoryError> {
        self.state
            .lock()
            .calls
            .push(DirectoryCall::LookupById(external_id.to_string()));
        self.gate().await;
        self.delay().await;

        let state = self.state.lock();
        if state.lookups_fail {
            return Err(DirectoryError::Unavailable("lookups disabled".to_string()));
        }
        Ok(state
            .snapshot
            .users
            .iter()
            .find(|u| u.id == external_id)
            .map(DirectoryUser::profile))
    }

    async fn list_channel_members(
        &self,
        channel: &ChannelId,
    ) -> std::result::Result<Vec<String>, DirectoryError> {
        self.state
            .lock()
            .calls
            .push(DirectoryCall::ListMembers(channel.to_string()));
        self.delay().await;

        let state = self.state.lock();
        if state.failing_channels.contains(channel.as_str()) {
            return Err(DirectoryError::Api(format!(
                "channel_not_found: {channel}"
            )));
        }
        state
            .snapshot
            .channels
            .get(channel.as_str())
            .cloned()
            .ok_or_else(|| DirectoryError::Api(format!("channel_not_found: {channel}")))
    }

    async fn update_channel_topic(
        &self,
        channel: &ChannelId,
        text: &str,
    ) -> std::result::Result<bool, DirectoryError> {
        self.state.lock().calls.push(DirectoryCall::UpdateTopic {
            channel: channel.to_string(),
            text: text.to_string(),
        });
        self.delay().await;

        let mut state = self.state.lock();
        if state.failing_channels.contains(channel.as_str()) {
            return Err(DirectoryError::Api(format!(
                "channel_not_found: {channel}"
            )));
        }
        if !state.snapshot.channels.contains_key(channel.as_str()) {
            return Ok(false);
        }
        state
            .topics
            .insert(channel.to_string(), text.to_string());
        Ok(true)
    }
}
