// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::TransportError;
use crate::event::{Message, SocketEvent};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub display_name: String,
    pub display_name_normalized: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Cursor of the following page, if there is one.
    pub fn next(&self) -> Option<&str> {
        if !self.has_more {
            return None;
        }
        self.next_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, TransportError>;
    async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, TransportError>;
}

/// Paginated access to past channel messages and thread replies.
#[async_trait]
pub trait HistorySource: MetadataLookup {
    async fn history(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Message>, TransportError>;

    async fn replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page<Message>, TransportError>;
}

/// Live stream of Socket Mode events.
#[async_trait]
pub trait EventStream: Send {
    /// Next event, or `None` once the stream has ended cleanly.
    async fn next_event(&mut self) -> Result<Option<SocketEvent>, TransportError>;

    async fn ack(&mut self, envelope_id: &str) -> Result<(), TransportError>;
}

/// Runs `fut` unless `cancel` fires first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TransportError::Cancelled),
        result = fut => result,
    }
}

/// Sleeps for `delay`. Returns false if cancelled while waiting.
pub async fn backoff(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

/// Repeats a call for as long as it reports a rate limit, waiting `delay`
/// between attempts.
pub async fn retry_rate_limited<T, F, Fut>(
    cancel: &CancellationToken,
    delay: Duration,
    what: &str,
    mut call: F,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    loop {
        match cancellable(cancel, call()).await {
            Err(TransportError::RateLimited { retry_after }) => {
                warn!(
                    "SLACK | Rate limited on {what} (server asked for {retry_after:?}), backing off for {delay:?}"
                );
                if !backoff(cancel, delay).await {
                    return Err(TransportError::Cancelled);
                }
            }
            other => return other,
        }
    }
}
