//! Slack Web API implementation of [`ChatPlatform`]
//!
//! Inbound events are read by polling `conversations.history` on every
//! direct channel this client opened, starting from the moment the
//! channel was opened.

use super::{
    ChannelId, ChatError, ChatPlatform, InboundEvent, OutboundMessage, Participant, PostedMessage,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

/// Slack's own system account
const SLACKBOT_USER_ID: &str = "USLACKBOT";
const USERS_PAGE_LIMIT: u32 = 200;
const HISTORY_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl SlackConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://slack.com/api";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersListResponse {
    #[serde(default)]
    members: Vec<SlackMember>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackMember {
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    profile: SlackProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    image_512: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationsOpenResponse {
    channel: Option<SlackChannel>,
}

#[derive(Debug, Deserialize)]
struct SlackChannel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    channel: Option<String>,
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

// ============================================================================
// Conversions
// ============================================================================

impl SlackMember {
    fn into_participant(self) -> Option<Participant> {
        let id = self.id.filter(|id| !id.trim().is_empty())?;
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let display_name = non_empty(self.profile.display_name)
            .or_else(|| non_empty(self.profile.real_name))
            .or_else(|| non_empty(self.name))
            .unwrap_or_else(|| id.clone());
        Some(Participant {
            is_service_account: self.is_bot || self.deleted || id == SLACKBOT_USER_ID,
            id: UserId(id),
            display_name,
            avatar_url: self.profile.image_512.unwrap_or_default(),
        })
    }
}

impl HistoryMessage {
    fn into_event(self, channel: &ChannelId) -> InboundEvent {
        let subtype = self
            .subtype
            .or_else(|| self.bot_id.map(|_| "bot_message".to_string()));
        InboundEvent {
            channel: Some(channel.clone()),
            text: self.text,
            subtype,
        }
    }
}

/// Slack timestamp (`<seconds>.<micros>`) for a point in time
fn slack_ts(at: DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

fn truncate_for_error(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let truncated: String = body.chars().take(max_chars).collect();
    format!("{truncated}...")
}

/// Fail unless the envelope carries `ok: true`
fn check_envelope(operation: &str, body: &Value) -> Result<(), ChatError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    let code = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error");
    Err(ChatError::from_api_code(operation, code))
}

// ============================================================================
// Client
// ============================================================================

pub struct SlackPlatform {
    http: Client,
    api_base: String,
    bot_token: String,
    /// `oldest` cursor per opened direct channel
    watermarks: Mutex<BTreeMap<ChannelId, String>>,
}

impl SlackPlatform {
    pub fn new(config: &SlackConfig) -> Result<Self, ChatError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("report-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatError::transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.trim().to_string(),
            watermarks: Mutex::new(BTreeMap::new()),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, ChatError> {
        let response = request
            .bearer_auth(&self.bot_token)
            .send()
            .await
            .map_err(|e| ChatError::transport(format!("{operation} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::from_status(
                operation,
                status.as_u16(),
                &truncate_for_error(&body, 400),
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            ChatError::invalid_response(format!("failed to decode {operation}: {e}"))
        })?;
        check_envelope(operation, &body)?;
        serde_json::from_value(body).map_err(|e| {
            ChatError::invalid_response(format!("unexpected {operation} payload: {e}"))
        })
    }

    /// Verify the token and return the bot's own user id
    pub async fn auth_check(&self) -> Result<String, ChatError> {
        let response: AuthTestResponse = self
            .call("auth.test", self.http.post(self.url("auth.test")))
            .await?;
        response
            .user_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ChatError::invalid_response("auth.test did not return user_id"))
    }

    fn watermark(&self, channel: &ChannelId) -> Option<String> {
        self.watermarks
            .lock()
            .ok()
            .and_then(|marks| marks.get(channel).cloned())
    }

    fn set_watermark(&self, channel: &ChannelId, ts: String) {
        if let Ok(mut marks) = self.watermarks.lock() {
            marks.insert(channel.clone(), ts);
        }
    }

    fn open_channels(&self) -> Vec<ChannelId> {
        self.watermarks
            .lock()
            .map(|marks| marks.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every message after the channel's watermark, oldest first.
    ///
    /// Pages run newest to oldest, so the watermark moves to the first
    /// message of the first page once the whole range has been read.
    async fn channel_history(&self, channel: &ChannelId) -> Result<Vec<InboundEvent>, ChatError> {
        let oldest = self.watermark(channel).unwrap_or_else(|| slack_ts(Utc::now()));
        let limit = HISTORY_PAGE_LIMIT.to_string();
        let mut messages: Vec<HistoryMessage> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![
                ("channel", channel.as_str().to_string()),
                ("oldest", oldest.clone()),
                ("inclusive", "false".to_string()),
                ("limit", limit.clone()),
            ];
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }
            let request = self.http.get(self.url("conversations.history")).query(&query);
            let page: HistoryResponse = self.call("conversations.history", request).await?;
            messages.extend(page.messages);

            cursor = page
                .response_metadata
                .and_then(|meta| meta.next_cursor)
                .filter(|next| !next.is_empty());
            if !page.has_more {
                break;
            }
            if cursor.is_none() {
                tracing::warn!(
                    channel = %channel,
                    read = messages.len(),
                    "History has more messages but no cursor; older messages skipped"
                );
                break;
            }
        }

        if let Some(newest) = messages.first().and_then(|m| m.ts.clone()) {
            self.set_watermark(channel, newest);
        }
        Ok(messages
            .into_iter()
            .rev()
            .map(|message| message.into_event(channel))
            .collect())
    }
}

#[async_trait]
impl ChatPlatform for SlackPlatform {
    async fn list_participants(&self) -> Result<Vec<Participant>, ChatError> {
        let mut participants = Vec::new();
        let mut cursor: Option<String> = None;
        let limit = USERS_PAGE_LIMIT.to_string();

        loop {
            let mut query = vec![("limit", limit.clone())];
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }
            let request = self.http.get(self.url("users.list")).query(&query);
            let page: UsersListResponse = self.call("users.list", request).await?;

            participants.extend(
                page.members
                    .into_iter()
                    .filter_map(SlackMember::into_participant),
            );

            cursor = page
                .response_metadata
                .and_then(|meta| meta.next_cursor)
                .filter(|next| !next.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        Ok(participants)
    }

    async fn open_direct_channel(&self, user: &UserId) -> Result<ChannelId, ChatError> {
        let request = self
            .http
            .post(self.url("conversations.open"))
            .form(&[("users", user.as_str())]);
        let response: ConversationsOpenResponse = self.call("conversations.open", request).await?;
        let channel = response
            .channel
            .map(|c| ChannelId(c.id))
            .ok_or_else(|| ChatError::invalid_response("conversations.open missing channel"))?;

        // Each cycle reads only what arrives after its own open
        self.set_watermark(&channel, slack_ts(Utc::now()));
        Ok(channel)
    }

    async fn post_message(&self, message: &OutboundMessage) -> Result<PostedMessage, ChatError> {
        let mut payload = Map::new();
        payload.insert("channel".into(), json!(message.channel.as_str()));
        payload.insert("text".into(), json!(message.text));
        if let Some(thread_ts) = &message.thread_ts {
            payload.insert("thread_ts".into(), json!(thread_ts));
        }
        if let Some(attribution) = &message.attribution {
            payload.insert("username".into(), json!(attribution.name));
            if !attribution.avatar_url.is_empty() {
                payload.insert("icon_url".into(), json!(attribution.avatar_url));
            }
        }

        let request = self
            .http
            .post(self.url("chat.postMessage"))
            .json(&Value::Object(payload));
        let response: PostMessageResponse = self.call("chat.postMessage", request).await?;
        let ts = response
            .ts
            .ok_or_else(|| ChatError::invalid_response("chat.postMessage response missing ts"))?;

        Ok(PostedMessage {
            channel: response
                .channel
                .map_or_else(|| message.channel.clone(), ChannelId),
            ts,
        })
    }

    async fn poll_inbound_events(&self) -> Result<Vec<InboundEvent>, ChatError> {
        let mut events = Vec::new();
        for channel in self.open_channels() {
            // One failing channel must not hold back answers from the others
            match self.channel_history(&channel).await {
                Ok(batch) => events.extend(batch),
                Err(e) => {
                    tracing::warn!(channel = %channel, error = %e, "Failed to read channel history");
                }
            }
        }
        Ok(events)
    }
}
