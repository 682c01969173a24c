/// Bot API client over HTTPS
use crate::{
    error::{WardenError, WardenResult},
    platform::{ensure_file_size, ChatInfo, ChatPlatform, LinkButton},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Response envelope shared by every method
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatPhoto {
    big_file_id: String,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
    title: Option<String>,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    photo: Option<ChatPhoto>,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct UserProfilePhotos {
    photos: Vec<Vec<PhotoSize>>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    file_path: Option<String>,
}

/// Client for `<api_url>/bot<token>/<method>`
#[derive(Clone)]
pub struct BotApiClient {
    http: Client,
    method_base: String,
    file_base: String,
}

impl std::fmt::Debug for BotApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApiClient").finish_non_exhaustive()
    }
}

impl BotApiClient {
    pub fn new(api_url: &str, bot_token: &str, timeout_secs: u64) -> WardenResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| WardenError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let api_url = api_url.trim_end_matches('/');
        Ok(Self {
            http,
            method_base: format!("{}/bot{}", api_url, bot_token),
            file_base: format!("{}/file/bot{}", api_url, bot_token),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> WardenResult<T> {
        debug!(method, "Bot API call");

        // without_url keeps the token out of error text
        let response = self
            .http
            .post(format!("{}/{}", self.method_base, method))
            .json(&params)
            .send()
            .await
            .map_err(|e| WardenError::Platform(format!("{}: {}", method, e.without_url())))?;

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| WardenError::Platform(format!("{}: {}", method, e.without_url())))?;

        if !body.ok {
            return Err(WardenError::Platform(
                body.description
                    .unwrap_or_else(|| format!("{} failed", method)),
            ));
        }

        body.result
            .ok_or_else(|| WardenError::Platform(format!("{}: empty result", method)))
    }
}

#[async_trait]
impl ChatPlatform for BotApiClient {
    async fn ban_member(&self, chat_id: i64, user_id: i64) -> WardenResult<()> {
        self.call::<bool>(
            "banChatMember",
            json!({ "chat_id": chat_id, "user_id": user_id, "revoke_messages": true }),
        )
        .await?;
        Ok(())
    }

    async fn unban_member(&self, chat_id: i64, user_id: i64) -> WardenResult<()> {
        self.call::<bool>(
            "unbanChatMember",
            json!({ "chat_id": chat_id, "user_id": user_id, "only_if_banned": true }),
        )
        .await?;
        Ok(())
    }

    async fn restrict_member(
        &self,
        chat_id: i64,
        user_id: i64,
        until: DateTime<Utc>,
    ) -> WardenResult<()> {
        self.call::<bool>(
            "restrictChatMember",
            json!({
                "chat_id": chat_id,
                "user_id": user_id,
                "permissions": {
                    "can_send_messages": false,
                    "can_send_audios": false,
                    "can_send_documents": false,
                    "can_send_photos": false,
                    "can_send_videos": false,
                    "can_send_video_notes": false,
                    "can_send_voice_notes": false,
                    "can_send_polls": false,
                    "can_send_other_messages": false,
                    "can_add_web_page_previews": false
                },
                "until_date": until.timestamp(),
            }),
        )
        .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        button: Option<&LinkButton>,
    ) -> WardenResult<()> {
        let mut params = json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" });
        if let Some(button) = button {
            params["reply_markup"] = json!({
                "inline_keyboard": [[{ "text": button.text, "url": button.url }]]
            });
        }
        self.call::<Value>("sendMessage", params).await?;
        Ok(())
    }

    async fn get_chat(&self, chat_id: i64) -> WardenResult<ChatInfo> {
        let chat: RawChat = self.call("getChat", json!({ "chat_id": chat_id })).await?;
        Ok(ChatInfo {
            id: chat.id,
            title: chat.title,
            username: chat.username,
            first_name: chat.first_name,
            last_name: chat.last_name,
            photo_file_id: chat.photo.map(|p| p.big_file_id),
        })
    }

    async fn get_user_profile_photos(&self, user_id: i64) -> WardenResult<Option<String>> {
        let photos: UserProfilePhotos = self
            .call("getUserProfilePhotos", json!({ "user_id": user_id, "limit": 1 }))
            .await?;
        Ok(photos
            .photos
            .into_iter()
            .next()
            .and_then(|sizes| sizes.into_iter().last())
            .map(|size| size.file_id))
    }

    async fn get_file(&self, file_id: &str) -> WardenResult<String> {
        let file: RawFile = self.call("getFile", json!({ "file_id": file_id })).await?;
        file.file_path
            .ok_or_else(|| WardenError::Platform("File is not downloadable".to_string()))
    }

    async fn download_file(&self, file_path: &str) -> WardenResult<Vec<u8>> {
        let mut response = self
            .http
            .get(format!("{}/{}", self.file_base, file_path))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WardenError::Platform(format!("download: {}", e.without_url())))?;

        if let Some(len) = response.content_length() {
            ensure_file_size(usize::try_from(len).unwrap_or(usize::MAX))?;
        }

        // Content-Length may be absent, so the cap is also enforced per chunk
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| WardenError::Platform(format!("download: {}", e.without_url())))?
        {
            ensure_file_size(bytes.len() + chunk.len())?;
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    async fn get_chat_members_count(&self, chat_id: i64) -> WardenResult<i64> {
        self.call("getChatMemberCount", json!({ "chat_id": chat_id }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_token() {
        let client = BotApiClient::new("https://api.telegram.org/", "123:secret", 5).unwrap();
        assert!(!format!("{:?}", client).contains("secret"));
        assert_eq!(client.method_base, "https://api.telegram.org/bot123:secret");
        assert_eq!(client.file_base, "https://api.telegram.org/file/bot123:secret");
    }

    #[test]
    fn test_envelope_decoding() {
        let ok: ApiResponse<RawChat> = serde_json::from_str(
            r#"{"ok":true,"result":{"id":-1001,"title":"Main","photo":{"small_file_id":"s","big_file_id":"b"}}}"#,
        )
        .unwrap();
        let chat = ok.result.unwrap();
        assert_eq!(chat.photo.unwrap().big_file_id, "b");

        let err: ApiResponse<bool> =
            serde_json::from_str(r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
                .unwrap();
        assert!(!err.ok);
        assert_eq!(err.description.as_deref(), Some("Bad Request: chat not found"));
    }

    #[test]
    fn test_profile_photo_sizes() {
        let photos: UserProfilePhotos = serde_json::from_str(
            r#"{"total_count":1,"photos":[[{"file_id":"small"},{"file_id":"large"}]]}"#,
        )
        .unwrap();
        let largest = photos.photos.into_iter().next().and_then(|s| s.into_iter().last());
        assert_eq!(largest.unwrap().file_id, "large");
    }
}
