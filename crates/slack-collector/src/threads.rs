// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backfill::{send_or_stop, Stop};
use crate::error::TransportError;
use crate::metrics::CollectorMetrics;
use crate::record::{LogRecord, ThreadRequest};
use crate::transport::{backoff, cancellable, retry_rate_limited, HistorySource};

/// Fetches the replies of every queued thread root and emits one record per
/// reply. The root itself is not emitted again.
pub struct ThreadCollector<S: ?Sized> {
    source: Arc<S>,
    metrics: Arc<CollectorMetrics>,
    page_size: usize,
    rate_limit_backoff: Duration,
}

impl<S> ThreadCollector<S>
where
    S: HistorySource + ?Sized,
{
    pub fn new(
        source: Arc<S>,
        metrics: Arc<CollectorMetrics>,
        page_size: usize,
        rate_limit_backoff: Duration,
    ) -> Self {
        ThreadCollector {
            source,
            metrics,
            page_size,
            rate_limit_backoff,
        }
    }

    /// Consumes `queue` until it is closed or `cancel` fires.
    pub async fn run(
        self,
        mut queue: mpsc::Receiver<ThreadRequest>,
        sink: mpsc::Sender<LogRecord>,
        cancel: CancellationToken,
    ) {
        let mut threads = 0;
        loop {
            let request = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                request = queue.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            if self.collect(&request, &sink, &cancel).await.is_err() {
                break;
            }
            threads += 1;
        }
        info!("SLACK | Thread collector stopped after {threads} threads");
    }

    async fn collect(
        &self,
        request: &ThreadRequest,
        sink: &mpsc::Sender<LogRecord>,
        cancel: &CancellationToken,
    ) -> Result<(), Stop> {
        let mut cursor: Option<String> = None;
        loop {
            let page = match retry_rate_limited(
                cancel,
                self.rate_limit_backoff,
                "conversations.replies",
                || {
                    self.source.replies(
                        &request.channel_id,
                        &request.ts,
                        cursor.as_deref(),
                        self.page_size,
                    )
                },
            )
            .await
            {
                Ok(page) => page,
                Err(TransportError::Cancelled) => return Err(Stop),
                Err(e) => {
                    warn!("SLACK | Error getting replies for timestamp {:?}: {e}", request.ts);
                    self.metrics.inc_errors();
                    return Ok(());
                }
            };

            // A rate-limited channel lookup retries the whole page.
            let channel = match cancellable(cancel, self.source.channel_info(&request.channel_id))
                .await
            {
                Ok(channel) => Some(channel),
                Err(TransportError::Cancelled) => return Err(Stop),
                Err(TransportError::RateLimited { .. }) => {
                    warn!(
                        "SLACK | Rate limited resolving channel {}, retrying page in {:?}",
                        request.channel_id, self.rate_limit_backoff
                    );
                    if !backoff(cancel, self.rate_limit_backoff).await {
                        return Err(Stop);
                    }
                    continue;
                }
                Err(e) => {
                    warn!(
                        "SLACK | Error getting conversation info for channel {:?} with timestamp {}: {e}",
                        request.channel_id, request.ts
                    );
                    None
                }
            };

            // Slack lists the thread parent with the replies; history already emitted it.
            for reply in page.items.iter().filter(|m| m.ts != request.ts) {
                let Some(channel) = &channel else {
                    self.metrics.inc_errors();
                    continue;
                };
                let user = match retry_rate_limited(
                    cancel,
                    self.rate_limit_backoff,
                    "users.info",
                    || self.source.user_info(&reply.user),
                )
                .await
                {
                    Ok(user) => user,
                    Err(TransportError::Cancelled) => return Err(Stop),
                    Err(e) => {
                        warn!("SLACK | Error getting user {:?} from reply: {e}", reply.user);
                        self.metrics.inc_errors();
                        continue;
                    }
                };

                let thread_ts = reply.thread_ts.as_deref().unwrap_or(&request.ts);
                let record = match LogRecord::build(
                    reply,
                    thread_ts,
                    &request.channel_id,
                    &channel.name,
                    &user,
                ) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("SLACK | {e}");
                        self.metrics.inc_errors();
                        continue;
                    }
                };
                send_or_stop(sink, record, cancel).await?;
                self.metrics.add_out(1);
            }

            match page.next() {
                Some(next) => {
                    debug!(
                        "SLACK | Following replies cursor for thread {}",
                        request.ts
                    );
                    cursor = Some(next.to_string());
                }
                None => return Ok(()),
            }
        }
    }
}
