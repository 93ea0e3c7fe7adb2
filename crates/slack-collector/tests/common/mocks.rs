// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory Slack transport used by the collector tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use slack_collector::error::TransportError;
use slack_collector::event::{Message, SocketEvent};
use slack_collector::transport::{
    ChannelInfo, EventStream, HistorySource, MetadataLookup, Page, UserInfo,
};
use tokio::sync::mpsc;

/// Pages are addressed by cursor: no cursor is page 0, `"cursor-N"` is page N.
#[derive(Default)]
#[allow(dead_code)]
pub struct MockSlack {
    pub history: HashMap<String, Vec<Page<Message>>>,
    pub replies: HashMap<String, Vec<Page<Message>>>,
    pub failing_users: HashSet<String>,
    /// Number of upcoming `channel_info` calls answered with a rate limit.
    pub channel_rate_limits: AtomicUsize,
    pub channel_info_calls: AtomicUsize,
    pub reply_requests: Mutex<Vec<(String, Option<String>)>>,
}

#[allow(dead_code)]
impl MockSlack {
    pub fn with_history(mut self, channel: &str, pages: Vec<Vec<Message>>) -> Self {
        self.history.insert(channel.to_string(), paginate(pages));
        self
    }

    pub fn with_replies(mut self, thread_ts: &str, pages: Vec<Vec<Message>>) -> Self {
        self.replies.insert(thread_ts.to_string(), paginate(pages));
        self
    }

    pub fn failing_user(mut self, user: &str) -> Self {
        self.failing_users.insert(user.to_string());
        self
    }

    pub fn rate_limit_channel_info(self, times: usize) -> Self {
        self.channel_rate_limits.store(times, Ordering::SeqCst);
        self
    }
}

fn paginate(pages: Vec<Vec<Message>>) -> Vec<Page<Message>> {
    let count = pages.len();
    pages
        .into_iter()
        .enumerate()
        .map(|(i, items)| Page {
            items,
            has_more: i + 1 < count,
            next_cursor: (i + 1 < count).then(|| format!("cursor-{}", i + 1)),
        })
        .collect()
}

/// Parent message echoed at the top of every replies page.
pub fn thread_parent(thread_ts: &str) -> Message {
    Message {
        kind: "message".to_string(),
        user: "U1".to_string(),
        text: "thread parent".to_string(),
        ts: thread_ts.to_string(),
        thread_ts: Some(thread_ts.to_string()),
        ..Default::default()
    }
}

fn page_at(pages: Option<&Vec<Page<Message>>>, cursor: Option<&str>) -> Page<Message> {
    let index = cursor
        .and_then(|c| c.strip_prefix("cursor-"))
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(0);
    pages
        .and_then(|pages| pages.get(index))
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl MetadataLookup for MockSlack {
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, TransportError> {
        if self.failing_users.contains(user_id) {
            return Err(TransportError::Api("user_not_found".to_string()));
        }
        Ok(UserInfo {
            id: user_id.to_string(),
            display_name: format!("{user_id} display"),
            display_name_normalized: format!("{user_id} normalized"),
        })
    }

    async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, TransportError> {
        self.channel_info_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.channel_rate_limits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.channel_rate_limits.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::RateLimited { retry_after: None });
        }
        Ok(ChannelInfo {
            id: channel_id.to_string(),
            name: format!("{channel_id}-name"),
        })
    }
}

#[async_trait]
impl HistorySource for MockSlack {
    async fn history(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
        _limit: usize,
    ) -> Result<Page<Message>, TransportError> {
        Ok(page_at(self.history.get(channel_id), cursor))
    }

    async fn replies(
        &self,
        _channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
        _limit: usize,
    ) -> Result<Page<Message>, TransportError> {
        self.reply_requests
            .lock()
            .unwrap()
            .push((thread_ts.to_string(), cursor.map(str::to_string)));
        // like Slack, every page starts with the thread parent
        let mut page = page_at(self.replies.get(thread_ts), cursor);
        page.items.insert(0, thread_parent(thread_ts));
        Ok(page)
    }
}

/// Event stream fed from a channel; acknowledgements are recorded.
#[allow(dead_code)]
pub struct ScriptedEvents {
    pub events: mpsc::Receiver<SocketEvent>,
    pub acks: Arc<Mutex<Vec<String>>>,
    pub fail_acks: bool,
}

#[allow(dead_code)]
impl ScriptedEvents {
    pub fn new(fail_acks: bool) -> (Self, mpsc::Sender<SocketEvent>, Arc<Mutex<Vec<String>>>) {
        let (tx, events) = mpsc::channel(16);
        let acks = Arc::new(Mutex::new(Vec::new()));
        (
            ScriptedEvents {
                events,
                acks: Arc::clone(&acks),
                fail_acks,
            },
            tx,
            acks,
        )
    }
}

#[async_trait]
impl EventStream for ScriptedEvents {
    async fn next_event(&mut self) -> Result<Option<SocketEvent>, TransportError> {
        Ok(self.events.recv().await)
    }

    async fn ack(&mut self, envelope_id: &str) -> Result<(), TransportError> {
        if self.fail_acks {
            return Err(TransportError::WebSocket("connection reset".to_string()));
        }
        self.acks.lock().unwrap().push(envelope_id.to_string());
        Ok(())
    }
}
