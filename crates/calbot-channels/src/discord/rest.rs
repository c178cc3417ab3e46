//! Discord REST API message sink.

use async_trait::async_trait;
use calbot_core::error::{CalbotError, Result};
use calbot_core::traits::MessageSink;
use calbot_core::types::{Delivery, Fetch, MessageRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

const API_BASE: &str = "https://discord.com/api/v10";

/// Guild text channel type.
const GUILD_TEXT: u8 = 0;

pub struct DiscordSink {
    client: reqwest::Client,
    /// Private channel ids keyed by recipient.
    dm_channels: Mutex<HashMap<String, String>>,
}

impl DiscordSink {
    pub fn new(bot_token: &str) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bot {bot_token}")
            .parse()
            .map_err(|_| CalbotError::config("discord_token contains invalid characters"))?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("calbot (https://github.com/calbot, 0.3)"),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| CalbotError::channel(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            dm_channels: Mutex::new(HashMap::new()),
        })
    }

    /// Current bot identity.
    pub async fn get_me(&self) -> Result<DiscordUser> {
        let response = self
            .client
            .get(format!("{API_BASE}/users/@me"))
            .send()
            .await
            .map_err(request_err)?;
        decode(checked(response).await?).await
    }

    async fn message(&self, channel_id: &str, content: &str) -> Result<Delivery> {
        let response = self
            .client
            .post(format!("{API_BASE}/channels/{channel_id}/messages"))
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .map_err(request_err)?;
        let sent: DiscordMessage = decode(checked(response).await?).await?;
        Ok(Delivery {
            channel_id: sent.channel_id,
            delivered_at: parse_timestamp(&sent.timestamp),
            message_id: sent.id,
        })
    }

    async fn dm_channel(&self, user_id: &str) -> Result<String> {
        if let Some(id) = self.cached_dm(user_id) {
            return Ok(id);
        }
        let response = self
            .client
            .post(format!("{API_BASE}/users/@me/channels"))
            .json(&serde_json::json!({ "recipient_id": user_id }))
            .send()
            .await
            .map_err(request_err)?;
        let channel: DiscordChannelInfo = decode(checked(response).await?).await?;
        self.dm_channels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(user_id.to_string(), channel.id.clone());
        Ok(channel.id)
    }

    fn cached_dm(&self, user_id: &str) -> Option<String> {
        self.dm_channels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(user_id)
            .cloned()
    }
}

fn request_err(e: reqwest::Error) -> CalbotError {
    if e.is_timeout() {
        CalbotError::Timeout(e.to_string())
    } else {
        CalbotError::Http(e.to_string())
    }
}

/// Map a non-success status to an error, keeping the body for context.
async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), &body))
}

fn status_error(status: u16, body: &str) -> CalbotError {
    match status {
        401 => CalbotError::AuthFailed(format!("Discord {status}: {body}")),
        403 => CalbotError::PermissionDenied(format!("Discord {status}: {body}")),
        429 => CalbotError::RateLimited(format!("Discord {status}: {body}")),
        500..=599 => CalbotError::Http(format!("Discord {status}: {body}")),
        _ => CalbotError::channel(format!("Discord {status}: {body}")),
    }
}

/// Statuses that mean the message will never be reachable again.
fn is_gone(status: u16) -> bool {
    matches!(status, 403 | 404)
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| CalbotError::channel(format!("Invalid Discord response: {e}")))
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Ids of text channels called `name`, ignoring case.
fn text_channels_named(channels: &[DiscordChannelInfo], name: &str) -> Vec<String> {
    channels
        .iter()
        .filter(|c| c.kind == GUILD_TEXT)
        .filter(|c| c.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
        .map(|c| c.id.clone())
        .collect()
}

#[async_trait]
impl MessageSink for DiscordSink {
    fn name(&self) -> &str { "discord" }

    async fn fetch(&self, message: &MessageRef) -> Result<Fetch> {
        let response = self
            .client
            .get(format!(
                "{API_BASE}/channels/{}/messages/{}",
                message.channel_id, message.message_id
            ))
            .send()
            .await
            .map_err(request_err)?;
        let status = response.status().as_u16();
        if is_gone(status) {
            tracing::debug!("Message {} answered {status}", message.message_id);
            return Ok(Fetch::Missing);
        }
        checked(response).await?;
        Ok(Fetch::Found(message.clone()))
    }

    async fn channels_named(&self, community_id: &str, name: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{API_BASE}/guilds/{community_id}/channels"))
            .send()
            .await
            .map_err(request_err)?;
        let channels: Vec<DiscordChannelInfo> = decode(checked(response).await?).await?;
        Ok(text_channels_named(&channels, name))
    }

    async fn send(&self, channel_id: &str, content: &str) -> Result<Delivery> {
        self.message(channel_id, content).await
    }

    async fn edit(&self, message: &MessageRef, content: &str) -> Result<()> {
        let response = self
            .client
            .patch(format!(
                "{API_BASE}/channels/{}/messages/{}",
                message.channel_id, message.message_id
            ))
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .map_err(request_err)?;
        checked(response).await?;
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<()> {
        let response = self
            .client
            .delete(format!(
                "{API_BASE}/channels/{}/messages/{}",
                message.channel_id, message.message_id
            ))
            .send()
            .await
            .map_err(request_err)?;
        if response.status().as_u16() == 404 {
            return Ok(());
        }
        checked(response).await?;
        Ok(())
    }

    async fn send_direct(&self, user_id: &str, content: &str) -> Result<Delivery> {
        let channel_id = self.dm_channel(user_id).await?;
        self.message(&channel_id, content).await
    }

    async fn remove_reaction(&self, message: &MessageRef, emoji: &str, user_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!(
                "{API_BASE}/channels/{}/messages/{}/reactions/{}/{user_id}",
                message.channel_id,
                message.message_id,
                urlencoding::encode(emoji)
            ))
            .send()
            .await
            .map_err(request_err)?;
        checked(response).await?;
        Ok(())
    }
}

// --- Discord API Types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    pub bot: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordChannelInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_channels_named_ignores_case_and_voice() {
        let channels: Vec<DiscordChannelInfo> = serde_json::from_value(serde_json::json!([
            { "id": "1", "type": 0, "name": "General" },
            { "id": "2", "type": 2, "name": "general" },
            { "id": "3", "type": 0, "name": "events" },
            { "id": "4", "type": 0, "name": "general" },
            { "id": "5", "type": 4 }
        ]))
        .expect("channels");
        assert_eq!(text_channels_named(&channels, "general"), vec!["1", "4"]);
        assert!(text_channels_named(&channels, "missing").is_empty());
    }

    #[test]
    fn test_status_mapping() {
        assert!(is_gone(404));
        assert!(is_gone(403));
        assert!(!is_gone(500));
        assert!(status_error(503, "").is_transient());
        assert!(status_error(429, "").is_transient());
        assert!(matches!(status_error(401, ""), CalbotError::AuthFailed(_)));
    }

    #[test]
    fn test_parse_timestamp() {
        let at = parse_timestamp("2026-05-01T10:00:00.123000+00:00");
        assert_eq!(at.to_rfc3339(), "2026-05-01T10:00:00.123+00:00");
    }

    #[test]
    fn test_rejects_bad_token() {
        assert!(matches!(DiscordSink::new("bad\ntoken"), Err(CalbotError::Config(_))));
    }

    #[test]
    fn test_message_decodes_without_extra_fields() {
        let msg: DiscordMessage = serde_json::from_value(serde_json::json!({
            "id": "10", "channel_id": "20", "timestamp": "2026-05-01T10:00:00+00:00",
            "content": "hi", "author": { "id": "1", "username": "bot" }
        }))
        .expect("message");
        assert_eq!(msg.id, "10");
    }
}
