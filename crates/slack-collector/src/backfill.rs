// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Historical backfill of channel history.
//!
//! One worker per authorized channel walks `conversations.history` page by
//! page. Every message is sent to the sink directly and its timestamp is
//! queued for the [`ThreadCollector`](crate::threads::ThreadCollector).
//! The thread queue and the sink are released only after every worker has
//! been joined.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channels::ChannelFilter;
use crate::error::TransportError;
use crate::event::Message;
use crate::metrics::CollectorMetrics;
use crate::record::{format_timestamp, LogRecord, ThreadRequest};
use crate::transport::{cancellable, retry_rate_limited, ChannelInfo, HistorySource};

pub struct HistoryCollector<S: ?Sized> {
    source: Arc<S>,
    filter: Arc<ChannelFilter>,
    metrics: Arc<CollectorMetrics>,
    page_size: usize,
    rate_limit_backoff: Duration,
}

impl<S> HistoryCollector<S>
where
    S: HistorySource + ?Sized + 'static,
{
    pub fn new(
        source: Arc<S>,
        filter: Arc<ChannelFilter>,
        metrics: Arc<CollectorMetrics>,
        page_size: usize,
        rate_limit_backoff: Duration,
    ) -> Self {
        HistoryCollector {
            source,
            filter,
            metrics,
            page_size,
            rate_limit_backoff,
        }
    }

    /// Walks the history of every channel, then drops `threads` and `sink`.
    pub async fn run(
        self,
        threads: mpsc::Sender<ThreadRequest>,
        sink: mpsc::Sender<LogRecord>,
        cancel: CancellationToken,
    ) {
        let mut workers = JoinSet::new();
        for channel_id in self.filter.iter() {
            let worker = ChannelWorker {
                source: Arc::clone(&self.source),
                metrics: Arc::clone(&self.metrics),
                channel_id: channel_id.to_string(),
                page_size: self.page_size,
                rate_limit_backoff: self.rate_limit_backoff,
                threads: threads.clone(),
                sink: sink.clone(),
                cancel: cancel.clone(),
            };
            workers.spawn(worker.run());
        }

        let mut emitted = 0;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(count) => emitted += count,
                Err(e) => error!("SLACK | History worker failed: {e}"),
            }
        }
        info!(
            "SLACK | History backfill finished for {} channels, {emitted} messages",
            self.filter.len()
        );
        // every worker has stopped; close the thread queue and the sink
        drop(threads);
        drop(sink);
    }
}

struct ChannelWorker<S: ?Sized> {
    source: Arc<S>,
    metrics: Arc<CollectorMetrics>,
    channel_id: String,
    page_size: usize,
    rate_limit_backoff: Duration,
    threads: mpsc::Sender<ThreadRequest>,
    sink: mpsc::Sender<LogRecord>,
    cancel: CancellationToken,
}

impl<S> ChannelWorker<S>
where
    S: HistorySource + ?Sized,
{
    /// Returns the number of records emitted.
    async fn run(self) -> usize {
        let mut cursor: Option<String> = None;
        let mut emitted = 0;
        loop {
            let page = match retry_rate_limited(
                &self.cancel,
                self.rate_limit_backoff,
                "conversations.history",
                || {
                    self.source
                        .history(&self.channel_id, cursor.as_deref(), self.page_size)
                },
            )
            .await
            {
                Ok(page) => page,
                Err(TransportError::Cancelled) => return emitted,
                Err(e) => {
                    error!(
                        "SLACK | Error getting history for channel id {}: {e}",
                        self.channel_id
                    );
                    self.metrics.inc_errors();
                    return emitted;
                }
            };
            debug!(
                "SLACK | Got {} history messages for channel {}",
                page.items.len(),
                self.channel_id
            );

            let Some(channel) = self.resolve_channel().await else {
                return emitted;
            };
            for message in &page.items {
                match self.emit(message, channel.as_ref()).await {
                    Ok(true) => emitted += 1,
                    Ok(false) => {}
                    Err(Stop) => return emitted,
                }
            }

            match page.next() {
                Some(next) => cursor = Some(next.to_string()),
                None => return emitted,
            }
        }
    }

    /// Outer `None` means cancelled. Inner `None` means the lookup failed and
    /// the page's messages will be skipped.
    async fn resolve_channel(&self) -> Option<Option<ChannelInfo>> {
        match retry_rate_limited(
            &self.cancel,
            self.rate_limit_backoff,
            "conversations.info",
            || self.source.channel_info(&self.channel_id),
        )
        .await
        {
            Ok(channel) => Some(Some(channel)),
            Err(TransportError::Cancelled) => None,
            Err(e) => {
                warn!(
                    "SLACK | Error getting conversation info for {}: {e}",
                    self.channel_id
                );
                Some(None)
            }
        }
    }

    /// Queues the thread and emits one record. `Ok(false)` means skipped.
    async fn emit(&self, message: &Message, channel: Option<&ChannelInfo>) -> Result<bool, Stop> {
        if let Err(e) = format_timestamp(&message.ts) {
            warn!("SLACK | {e}");
            self.metrics.inc_errors();
            return Ok(false);
        }

        let request = ThreadRequest {
            channel_id: self.channel_id.clone(),
            ts: message.ts.clone(),
        };
        send_or_stop(&self.threads, request, &self.cancel).await?;

        let Some(channel) = channel else {
            self.metrics.inc_errors();
            return Ok(false);
        };
        let user = match retry_rate_limited(
            &self.cancel,
            self.rate_limit_backoff,
            "users.info",
            || self.source.user_info(&message.user),
        )
        .await
        {
            Ok(user) => user,
            Err(TransportError::Cancelled) => return Err(Stop),
            Err(e) => {
                warn!("SLACK | Error getting user {:?} from message: {e}", message.user);
                self.metrics.inc_errors();
                return Ok(false);
            }
        };

        let thread_ts = message.thread_ts.as_deref().unwrap_or(&message.ts);
        let record = match LogRecord::build(message, thread_ts, &self.channel_id, &channel.name, &user)
        {
            Ok(record) => record,
            Err(e) => {
                warn!("SLACK | {e}");
                self.metrics.inc_errors();
                return Ok(false);
            }
        };
        send_or_stop(&self.sink, record, &self.cancel).await?;
        self.metrics.add_out(1);
        Ok(true)
    }
}

/// The receiving side is gone or the run was cancelled.
#[derive(Debug)]
pub(crate) struct Stop;

/// Sends with backpressure unless cancelled first.
pub(crate) async fn send_or_stop<T>(
    tx: &mpsc::Sender<T>,
    value: T,
    cancel: &CancellationToken,
) -> Result<(), Stop> {
    let sent = cancellable(cancel, async {
        tx.send(value).await.map_err(|_| TransportError::Cancelled)
    })
    .await;
    sent.map_err(|_| Stop)
}
