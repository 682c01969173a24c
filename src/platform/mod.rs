/// Chat-platform boundary
///
/// Every call is a single independent attempt; failures carry the platform's
/// own description and never roll back local state.
pub mod bot_api;
pub mod dry_run;

pub use bot_api::BotApiClient;
pub use dry_run::{DryRunPlatform, PlatformCall};

use crate::error::{WardenError, WardenResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest file the backend downloads; matches the Bot API download limit
pub const MAX_FILE_BYTES: usize = 20 * 1024 * 1024;

/// Fails once a download grows past `MAX_FILE_BYTES`
pub fn ensure_file_size(len: usize) -> WardenResult<()> {
    if len > MAX_FILE_BYTES {
        return Err(WardenError::Platform(format!(
            "File exceeds {} bytes",
            MAX_FILE_BYTES
        )));
    }
    Ok(())
}

/// Chat or user profile as seen by the platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// File id of the chat photo, if any
    pub photo_file_id: Option<String>,
}

impl ChatInfo {
    /// First and last name joined, when either is present
    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }
}

/// Inline URL button attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkButton {
    pub text: String,
    pub url: String,
}

/// Operations the moderation backend needs from the chat platform
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Ban a member and revoke their messages
    async fn ban_member(&self, chat_id: i64, user_id: i64) -> WardenResult<()>;

    /// Lift a ban; a member who is not banned is left alone
    async fn unban_member(&self, chat_id: i64, user_id: i64) -> WardenResult<()>;

    /// Forbid messages, media and other content until `until`
    async fn restrict_member(
        &self,
        chat_id: i64,
        user_id: i64,
        until: DateTime<Utc>,
    ) -> WardenResult<()>;

    /// Send an HTML-formatted message
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        button: Option<&LinkButton>,
    ) -> WardenResult<()>;

    async fn get_chat(&self, chat_id: i64) -> WardenResult<ChatInfo>;

    /// File id of the user's most recent profile photo, largest size
    async fn get_user_profile_photos(&self, user_id: i64) -> WardenResult<Option<String>>;

    /// Resolve a file id to its download path
    async fn get_file(&self, file_id: &str) -> WardenResult<String>;

    async fn download_file(&self, file_path: &str) -> WardenResult<Vec<u8>>;

    async fn get_chat_members_count(&self, chat_id: i64) -> WardenResult<i64>;
}

/// Escape text for HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>spam & eggs</b>"), "&lt;b&gt;spam &amp; eggs&lt;/b&gt;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_file_size_cap() {
        assert!(ensure_file_size(0).is_ok());
        assert!(ensure_file_size(MAX_FILE_BYTES).is_ok());
        assert!(matches!(
            ensure_file_size(MAX_FILE_BYTES + 1),
            Err(WardenError::Platform(_))
        ));
    }

    #[test]
    fn test_full_name() {
        let mut info = ChatInfo {
            first_name: Some("Ada".into()),
            ..Default::default()
        };
        assert_eq!(info.full_name().as_deref(), Some("Ada"));
        info.last_name = Some("Lovelace".into());
        assert_eq!(info.full_name().as_deref(), Some("Ada Lovelace"));
        assert_eq!(ChatInfo::default().full_name(), None);
    }
}
