// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Live collection over Socket Mode.
//!
//! ```text
//!   EventStream ──> classify ──> BatchBuffer ──(tick / shutdown)──> sink
//!        ^                │
//!        └──── ack ───────┘
//! ```
//!
//! The event loop and the flusher run as separate tasks. The flusher owns the
//! only sink sender, so the sink closes exactly once: when the flusher returns
//! after its final drain.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch_buffer::BatchBuffer;
use crate::channels::ChannelFilter;
use crate::classifier::{classify, Classified};
use crate::error::{ClassifyError, CollectorError};
use crate::event::{InboundEvent, SocketEvent};
use crate::metrics::CollectorMetrics;
use crate::record::LogRecord;
use crate::transport::{EventStream, MetadataLookup};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveState {
    Running,
    Draining,
    Stopped,
}

pub struct LiveCollector<E, L: ?Sized> {
    events: E,
    lookup: Arc<L>,
    filter: Arc<ChannelFilter>,
    buffer: Arc<BatchBuffer>,
    metrics: Arc<CollectorMetrics>,
    flush_interval: Duration,
    state: watch::Sender<LiveState>,
}

impl<E, L> LiveCollector<E, L>
where
    E: EventStream,
    L: MetadataLookup + ?Sized + 'static,
{
    pub fn new(
        events: E,
        lookup: Arc<L>,
        filter: Arc<ChannelFilter>,
        metrics: Arc<CollectorMetrics>,
        flush_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(LiveState::Running);
        LiveCollector {
            events,
            lookup,
            filter,
            buffer: Arc::new(BatchBuffer::new()),
            metrics,
            flush_interval,
            state,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LiveState> {
        self.state.subscribe()
    }

    /// Collects until `cancel` fires or the event stream ends.
    ///
    /// Buffered records are always flushed and the sink closed before this
    /// returns, including when the transport fails.
    pub async fn run(
        mut self,
        sink: mpsc::Sender<LogRecord>,
        cancel: CancellationToken,
    ) -> Result<(), CollectorError> {
        let flush_token = CancellationToken::new();
        let flusher = BatchFlusher {
            buffer: Arc::clone(&self.buffer),
            metrics: Arc::clone(&self.metrics),
            sink,
            interval: self.flush_interval,
        };
        let flush_handle = tokio::spawn(flusher.run(flush_token.clone()));

        let result = self.event_loop(&cancel).await;

        self.state.send_replace(LiveState::Draining);
        flush_token.cancel();
        if let Err(e) = flush_handle.await {
            error!("SLACK | Batch flusher task failed: {e}");
        }
        self.state.send_replace(LiveState::Stopped);
        info!("SLACK | Live collector stopped");
        result
    }

    async fn event_loop(&mut self, cancel: &CancellationToken) -> Result<(), CollectorError> {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("SLACK | Shutting down socket mode listener");
                    return Ok(());
                }
                next = self.events.next_event() => next?,
            };

            match next {
                Some(SocketEvent::EventsApi { envelope_id, event }) => {
                    if !self.handle_event(&envelope_id, &event, cancel).await {
                        return Ok(());
                    }
                }
                Some(SocketEvent::Connecting) => info!("SLACK | Connecting to Socket Mode"),
                Some(SocketEvent::Connected) => info!("SLACK | Connected to Socket Mode"),
                Some(SocketEvent::Disconnect { reason }) => {
                    info!("SLACK | Socket Mode asked to disconnect: {reason}");
                }
                Some(SocketEvent::Other(kind)) => debug!("SLACK | Ignoring {kind} envelope"),
                None => {
                    info!("SLACK | Event stream ended");
                    return Ok(());
                }
            }
        }
    }

    /// Returns false once cancellation was observed.
    async fn handle_event(
        &mut self,
        envelope_id: &str,
        event: &InboundEvent,
        cancel: &CancellationToken,
    ) -> bool {
        if !matches!(event, InboundEvent::Unsupported(_)) {
            self.metrics.inc_received();
        }

        let classified = tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            classified = classify(event, &self.filter, self.lookup.as_ref()) => classified,
        };

        match classified {
            Ok(Classified::Record { batch_key, record }) => self.buffer.put(batch_key, record),
            Ok(Classified::Skipped(reason)) => debug!("SLACK | Skipping event: {reason:?}"),
            Err(ClassifyError::Cancelled) => return false,
            Err(e) => {
                warn!("SLACK | Error handling event message: {e}");
                self.metrics.inc_errors();
                return true;
            }
        }

        if let Err(e) = self.events.ack(envelope_id).await {
            error!("SLACK | Failed to acknowledge envelope {envelope_id}: {e}");
            self.metrics.inc_errors();
        }
        true
    }
}

/// Drains the batch buffer into the sink on every tick and once more on
/// shutdown.
struct BatchFlusher {
    buffer: Arc<BatchBuffer>,
    metrics: Arc<CollectorMetrics>,
    sink: mpsc::Sender<LogRecord>,
    interval: Duration,
}

impl BatchFlusher {
    async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // discard the first, immediate tick
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    self.flush().await;
                    break;
                }
                _ = ticker.tick() => self.flush().await,
            }
        }
    }

    async fn flush(&self) {
        let batch = self.buffer.drain_all();
        if batch.is_empty() {
            return;
        }
        debug!("SLACK | Sending batch of {} messages", batch.len());
        let mut sent = 0;
        for record in batch {
            if self.sink.send(record).await.is_err() {
                error!("SLACK | Record sink closed, dropping the rest of the batch");
                break;
            }
            sent += 1;
        }
        self.metrics.add_out(sent);
        debug!("SLACK | Batch flushed, {sent} messages sent");
    }
}
