/// In-memory platform that records calls instead of sending them
use crate::{
    error::{WardenError, WardenResult},
    platform::{ensure_file_size, ChatInfo, ChatPlatform, LinkButton},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Mutating call observed by the dry-run platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Ban {
        chat_id: i64,
        user_id: i64,
    },
    Unban {
        chat_id: i64,
        user_id: i64,
    },
    Restrict {
        chat_id: i64,
        user_id: i64,
        until: DateTime<Utc>,
    },
    SendMessage {
        chat_id: i64,
        text: String,
        button: Option<LinkButton>,
    },
}

#[derive(Default)]
struct DryRunState {
    calls: Vec<PlatformCall>,
    failing_groups: HashSet<i64>,
    failing_notifications: HashSet<i64>,
    chats: HashMap<i64, ChatInfo>,
    member_counts: HashMap<i64, i64>,
    profile_photos: HashMap<i64, String>,
    files: HashMap<String, (String, Vec<u8>)>,
}

#[derive(Default)]
pub struct DryRunPlatform {
    state: Mutex<DryRunState>,
}

impl DryRunPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make member actions in this chat fail
    pub async fn fail_group(&self, chat_id: i64) {
        self.state.lock().await.failing_groups.insert(chat_id);
    }

    /// Make messages to this chat fail
    pub async fn fail_notifications(&self, chat_id: i64) {
        self.state.lock().await.failing_notifications.insert(chat_id);
    }

    pub async fn register_chat(&self, info: ChatInfo, member_count: i64) {
        let mut state = self.state.lock().await;
        state.member_counts.insert(info.id, member_count);
        state.chats.insert(info.id, info);
    }

    pub async fn register_file(&self, file_id: &str, file_path: &str, bytes: Vec<u8>) {
        self.state
            .lock()
            .await
            .files
            .insert(file_id.to_string(), (file_path.to_string(), bytes));
    }

    pub async fn set_profile_photo(&self, user_id: i64, file_id: &str) {
        self.state
            .lock()
            .await
            .profile_photos
            .insert(user_id, file_id.to_string());
    }

    pub async fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().await.calls.clone()
    }

    async fn member_action(&self, chat_id: i64, call: PlatformCall) -> WardenResult<()> {
        let mut state = self.state.lock().await;
        if state.failing_groups.contains(&chat_id) {
            return Err(WardenError::Platform(format!(
                "Bad Request: not enough rights in chat {}",
                chat_id
            )));
        }
        state.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for DryRunPlatform {
    async fn ban_member(&self, chat_id: i64, user_id: i64) -> WardenResult<()> {
        self.member_action(chat_id, PlatformCall::Ban { chat_id, user_id })
            .await
    }

    async fn unban_member(&self, chat_id: i64, user_id: i64) -> WardenResult<()> {
        self.member_action(chat_id, PlatformCall::Unban { chat_id, user_id })
            .await
    }

    async fn restrict_member(
        &self,
        chat_id: i64,
        user_id: i64,
        until: DateTime<Utc>,
    ) -> WardenResult<()> {
        self.member_action(
            chat_id,
            PlatformCall::Restrict {
                chat_id,
                user_id,
                until,
            },
        )
        .await
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        button: Option<&LinkButton>,
    ) -> WardenResult<()> {
        let mut state = self.state.lock().await;
        if state.failing_notifications.contains(&chat_id) {
            return Err(WardenError::Platform(format!(
                "Forbidden: bot can't send messages to chat {}",
                chat_id
            )));
        }
        state.calls.push(PlatformCall::SendMessage {
            chat_id,
            text: text.to_string(),
            button: button.cloned(),
        });
        Ok(())
    }

    async fn get_chat(&self, chat_id: i64) -> WardenResult<ChatInfo> {
        self.state
            .lock()
            .await
            .chats
            .get(&chat_id)
            .cloned()
            .ok_or_else(|| WardenError::Platform("Bad Request: chat not found".to_string()))
    }

    async fn get_user_profile_photos(&self, user_id: i64) -> WardenResult<Option<String>> {
        Ok(self.state.lock().await.profile_photos.get(&user_id).cloned())
    }

    async fn get_file(&self, file_id: &str) -> WardenResult<String> {
        self.state
            .lock()
            .await
            .files
            .get(file_id)
            .map(|(path, _)| path.clone())
            .ok_or_else(|| WardenError::Platform("Bad Request: invalid file_id".to_string()))
    }

    async fn download_file(&self, file_path: &str) -> WardenResult<Vec<u8>> {
        self.state
            .lock()
            .await
            .files
            .values()
            .find(|(path, _)| path == file_path)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| WardenError::Platform("Not Found".to_string()))
            .and_then(|bytes| {
                ensure_file_size(bytes.len())?;
                Ok(bytes)
            })
    }

    async fn get_chat_members_count(&self, chat_id: i64) -> WardenResult<i64> {
        self.state
            .lock()
            .await
            .member_counts
            .get(&chat_id)
            .copied()
            .ok_or_else(|| WardenError::Platform("Bad Request: chat not found".to_string()))
    }
}
