//! External directory adapter.
//!
//! The chat/identity system is reached only through [`DirectoryAdapter`].
//! One adapter instance is passed explicitly to the components that need
//! it ([`crate::users::UserResolver`], [`crate::sync::ParticipantSync`]);
//! there is no global client.
//!
//! Every call is a network call from the caller's point of view. Callers
//! wrap them in a timeout and turn failures into structured results rather
//! than propagating them.

mod static_dir;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

pub use static_dir::{DirectoryCall, DirectorySnapshot, DirectoryUser, StaticDirectory};

/// `https://<workspace>.slack.com/archives/<channel>` and
/// `https://app.slack.com/client/<team>/<channel>`.
static WEB_CHANNEL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https://(?:[A-Za-z0-9-]+\.)*slack\.com/(?:archives|client/[A-Z0-9]+)/([CGD][A-Z0-9]{2,})(?:[/?#].*)?$",
    )
    .expect("constant regex pattern is valid")
});

/// `slack://channel?team=<team>&id=<channel>`.
static DEEP_LINK_CHANNEL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^slack://channel\?(?:[^#]*&)?id=([CGD][A-Z0-9]{2,})(?:&.*)?$")
        .expect("constant regex pattern is valid")
});

/// Chat channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Wrap a raw channel id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Profile returned by a directory lookup. Every field is optional because
/// directories routinely omit some of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryProfile {
    /// Directory user id
    pub external_id: Option<String>,

    /// Email address
    pub email: Option<String>,

    /// Display name
    pub display_name: Option<String>,

    /// Given name
    pub first_name: Option<String>,

    /// Family name
    pub last_name: Option<String>,

    /// Avatar URL (unvalidated)
    pub avatar_url: Option<String>,
}

/// Failure talking to the directory. Distinct from "not found" and from
/// "channel has no members", which are successful answers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// The call did not finish within the allowed time.
    #[error("directory call timed out after {0:?}")]
    Timeout(Duration),

    /// The directory could not be reached.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// The directory answered with an error.
    #[error("directory API error: {0}")]
    Api(String),
}

/// Capability interface over the external chat/identity system.
#[async_trait]
pub trait DirectoryAdapter: Send + Sync {
    /// Look up a user by email.
    async fn lookup_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<DirectoryProfile>, DirectoryError>;

    /// Look up a user by directory id.
    async fn lookup_user_by_id(
        &self,
        external_id: &str,
    ) -> Result<Option<DirectoryProfile>, DirectoryError>;

    /// Member ids of a channel. An empty list is a valid answer.
    async fn list_channel_members(&self, channel: &ChannelId)
    -> Result<Vec<String>, DirectoryError>;

    /// Replace a channel's topic. Returns whether the directory accepted it.
    async fn update_channel_topic(
        &self,
        channel: &ChannelId,
        text: &str,
    ) -> Result<bool, DirectoryError>;

    /// Extract a channel id from a stored channel URL.
    fn parse_channel_id(&self, url: &str) -> Option<ChannelId> {
        parse_channel_url(url)
    }
}

/// Extract a channel id from a Slack web URL or deep link.
pub fn parse_channel_url(url: &str) -> Option<ChannelId> {
    let url = url.trim();
    WEB_CHANNEL_URL
        .captures(url)
        .or_else(|| DEEP_LINK_CHANNEL_URL.captures(url))
        .map(|caps| ChannelId::new(&caps[1]))
}

/// Run a directory call with a deadline, folding the timeout into
/// [`DirectoryError::Timeout`].
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, DirectoryError>
where
    F: Future<Output = Result<T, DirectoryError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(DirectoryError::Timeout(timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::archives("https://acme.slack.com/archives/C024BE91L", Some("C024BE91L"))]
    #[case::archives_trailing("https://acme.slack.com/archives/C024BE91L/p1234", Some("C024BE91L"))]
    #[case::client("https://app.slack.com/client/T024BE7LD/C024BE91L", Some("C024BE91L"))]
    #[case::private_group("https://acme.slack.com/archives/G01ABCDEF", Some("G01ABCDEF"))]
    #[case::deep_link("slack://channel?team=T024BE7LD&id=C024BE91L", Some("C024BE91L"))]
    #[case::padded("  https://acme.slack.com/archives/C024BE91L  ", Some("C024BE91L"))]
    #[case::insecure("http://acme.slack.com/archives/C024BE91L", None)]
    #[case::lowercase_id("https://acme.slack.com/archives/c024be91l", None)]
    #[case::other_host("https://example.com/archives/C024BE91L", None)]
    #[case::not_a_url("general", None)]
    fn test_parse_channel_url(#[case] url: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_channel_url(url), expected.map(ChannelId::new));
    }

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed() {
        let result: Result<(), DirectoryError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert_eq!(
            result,
            Err(DirectoryError::Timeout(Duration::from_millis(10)))
        );
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, DirectoryError>(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
