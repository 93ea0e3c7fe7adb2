// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Minimal Slack Web API client.
//!
//! Every call is a form-encoded `POST {api_url}/{method}` with a bearer token.
//! Slack reports most failures as `200 {"ok": false, "error": "..."}`; HTTP
//! 429 and the `ratelimited` error code both map to
//! [`TransportError::RateLimited`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::CollectorConfig;
use crate::error::TransportError;
use crate::event::Message;
use crate::http_utils::build_client;
use crate::slack::socket_mode::ConnectionOpener;
use crate::transport::{ChannelInfo, HistorySource, MetadataLookup, Page, UserInfo};

#[derive(Debug, Clone)]
pub struct SlackWebClient {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
    app_token: String,
}

#[derive(Deserialize)]
struct UserResponse {
    user: RawUser,
}

#[derive(Deserialize)]
struct RawUser {
    id: String,
    #[serde(default)]
    profile: RawProfile,
}

#[derive(Deserialize, Default)]
struct RawProfile {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    display_name_normalized: String,
}

#[derive(Deserialize)]
struct ChannelResponse {
    channel: ChannelInfo,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Deserialize)]
struct ConnectionResponse {
    url: String,
}

impl From<MessagesResponse> for Page<Message> {
    fn from(response: MessagesResponse) -> Self {
        Page {
            items: response.messages,
            has_more: response.has_more,
            next_cursor: response
                .response_metadata
                .map(|meta| meta.next_cursor)
                .filter(|cursor| !cursor.is_empty()),
        }
    }
}

impl SlackWebClient {
    pub fn new(config: &CollectorConfig) -> Result<Self, TransportError> {
        let client = build_client(config.https_proxy.as_deref(), config.request_timeout)?;
        Ok(SlackWebClient {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            app_token: config.app_token.clone(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        token: &str,
        params: &[(&str, &str)],
    ) -> Result<T, TransportError> {
        let url = format!("{}/{method}", self.api_url);
        debug!("SLACK | Calling {method}");
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(TransportError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(TransportError::Api(format!(
                "{method} returned status {status}"
            )));
        }

        let body: Value = response.json().await?;
        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            if error == "ratelimited" {
                return Err(TransportError::RateLimited { retry_after: None });
            }
            return Err(TransportError::Api(error.to_string()));
        }
        serde_json::from_value(body).map_err(|e| TransportError::Decode(format!("{method}: {e}")))
    }

    async fn messages(
        &self,
        method: &str,
        base: &[(&str, &str)],
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Message>, TransportError> {
        let limit = limit.to_string();
        let mut params: Vec<(&str, &str)> = base.to_vec();
        params.push(("inclusive", "true"));
        params.push(("limit", &limit));
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        let response: MessagesResponse = self.call(method, &self.bot_token, &params).await?;
        Ok(response.into())
    }
}

#[async_trait]
impl MetadataLookup for SlackWebClient {
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, TransportError> {
        let response: UserResponse = self
            .call("users.info", &self.bot_token, &[("user", user_id)])
            .await?;
        Ok(UserInfo {
            id: response.user.id,
            display_name: response.user.profile.display_name,
            display_name_normalized: response.user.profile.display_name_normalized,
        })
    }

    async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, TransportError> {
        let response: ChannelResponse = self
            .call(
                "conversations.info",
                &self.bot_token,
                &[("channel", channel_id)],
            )
            .await?;
        Ok(response.channel)
    }
}

#[async_trait]
impl HistorySource for SlackWebClient {
    async fn history(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Message>, TransportError> {
        self.messages(
            "conversations.history",
            &[("channel", channel_id)],
            cursor,
            limit,
        )
        .await
    }

    async fn replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Message>, TransportError> {
        self.messages(
            "conversations.replies",
            &[("channel", channel_id), ("ts", thread_ts)],
            cursor,
            limit,
        )
        .await
    }
}

#[async_trait]
impl ConnectionOpener for SlackWebClient {
    async fn open_connection(&self) -> Result<String, TransportError> {
        if self.app_token.is_empty() {
            return Err(TransportError::Api(
                "SLACK_APP_TOKEN is required for socket mode".to_string(),
            ));
        }
        let response: ConnectionResponse = self
            .call("apps.connections.open", &self.app_token, &[])
            .await?;
        Ok(response.url)
    }
}
