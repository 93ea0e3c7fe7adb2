// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wires collectors, the record sink and the importer together.
//!
//! ```text
//!   live:      LiveCollector ───────────────┐
//!                                           ├──> sink ──> Transporter ──> Importer
//!   backfill:  HistoryCollector ──┬─────────┤
//!                                 └─> thread queue ──> ThreadCollector
//! ```
//!
//! The sink closes once every producer has returned, which ends the
//! transporter.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use slack_collector::backfill::HistoryCollector;
use slack_collector::config::CollectorConfig;
use slack_collector::live::LiveCollector;
use slack_collector::metrics::CollectorMetrics;
use slack_collector::slack::{SlackWebClient, SocketModeClient};
use slack_collector::threads::ThreadCollector;
use slack_collector::transport::{EventStream, HistorySource, MetadataLookup};
use slack_collector::transporter::{Importer, TransportSummary, Transporter};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vlogs_importer::metrics::DeliveryMetrics;
use vlogs_importer::VlogsClient;

use crate::config::RelayConfig;
use crate::http::{self, StatusMetrics};

/// Runs the live collector until `cancel` fires or the event stream ends.
pub async fn live_pipeline<E, L, I>(
    events: E,
    lookup: Arc<L>,
    importer: Arc<I>,
    config: &CollectorConfig,
    metrics: Arc<CollectorMetrics>,
    cancel: CancellationToken,
) -> anyhow::Result<TransportSummary>
where
    E: EventStream,
    L: MetadataLookup + ?Sized + 'static,
    I: Importer + ?Sized + 'static,
{
    let (sink, records) = mpsc::channel(config.sink_capacity);
    let transporter = Transporter::new(importer);
    let pump = tokio::spawn(async move { transporter.run(records).await });

    let live = LiveCollector::new(
        events,
        lookup,
        Arc::new(config.channel_filter()),
        metrics,
        config.batch_flush_interval,
    );
    let collected = live.run(sink, cancel).await;

    let summary = pump.await.context("transporter task failed")?;
    collected.context("error run slack client")?;
    Ok(summary)
}

/// Walks channel history and every thread once.
pub async fn backfill_pipeline<S, I>(
    source: Arc<S>,
    importer: Arc<I>,
    config: &CollectorConfig,
    metrics: Arc<CollectorMetrics>,
    cancel: CancellationToken,
) -> anyhow::Result<TransportSummary>
where
    S: HistorySource + ?Sized + 'static,
    I: Importer + ?Sized + 'static,
{
    let (sink, records) = mpsc::channel(config.sink_capacity);
    let (threads_tx, threads_rx) = mpsc::channel(config.thread_queue_capacity);
    let transporter = Transporter::new(importer);
    let pump = tokio::spawn(async move { transporter.run(records).await });

    let threads = ThreadCollector::new(
        Arc::clone(&source),
        Arc::clone(&metrics),
        config.history_page_size,
        config.rate_limit_backoff,
    );
    let thread_task = tokio::spawn(threads.run(threads_rx, sink.clone(), cancel.clone()));

    let history = HistoryCollector::new(
        source,
        Arc::new(config.channel_filter()),
        metrics,
        config.history_page_size,
        config.rate_limit_backoff,
    );
    history.run(threads_tx, sink, cancel).await;

    thread_task.await.context("thread collector task failed")?;
    pump.await.context("transporter task failed")
}

/// Live mode: Socket Mode events plus the status server.
pub async fn run_live(config: RelayConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let collector_metrics = Arc::new(CollectorMetrics::default());
    let delivery_metrics = Arc::new(DeliveryMetrics::default());

    info!("Init slack client");
    let slack = Arc::new(
        SlackWebClient::new(&config.collector).context("error initialize slack client")?,
    );
    info!("Init vlogs client");
    let importer = Arc::new(
        VlogsClient::new(&config.vlogs, Arc::clone(&delivery_metrics))
            .context("error initialize VictoriaLogs client")?,
    );

    let listener = TcpListener::bind(config.http_listen_addr)
        .await
        .with_context(|| format!("cannot serve http at {}", config.http_listen_addr))?;
    let status = Arc::new(StatusMetrics::new(
        Arc::clone(&collector_metrics),
        delivery_metrics,
    ));
    let server_shutdown = CancellationToken::new();
    let server = tokio::spawn(http::serve(
        listener,
        status,
        server_shutdown.clone(),
        config.http_shutdown_timeout,
    ));

    info!("Start listen message in the channels");
    let result = match SocketModeClient::connect(
        Arc::clone(&slack),
        config.collector.rate_limit_backoff,
        cancel.clone(),
    )
    .await
    {
        Ok(events) => {
            live_pipeline(
                events,
                slack,
                importer,
                &config.collector,
                collector_metrics,
                cancel,
            )
            .await
        }
        Err(e) => Err(anyhow::Error::new(e).context("error open socket mode connection")),
    };

    server_shutdown.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("error shutdown http server: {e:#}"),
        Err(e) => error!("http server task failed: {e}"),
    }

    let summary = result?;
    info!(
        "Process stopped successfully, {} messages imported, {} failed",
        summary.imported, summary.failed
    );
    Ok(())
}

/// Backfill mode: history and threads of every configured channel.
pub async fn run_backfill(config: RelayConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    info!("Start migrate historical messages from slack to vlogs");
    let started = Instant::now();

    let collector_metrics = Arc::new(CollectorMetrics::default());
    let slack = Arc::new(
        SlackWebClient::new(&config.collector).context("error initialize slack client")?,
    );
    let importer = Arc::new(
        VlogsClient::new(&config.vlogs, Arc::new(DeliveryMetrics::default()))
            .context("error initialize VictoriaLogs client")?,
    );

    let summary = backfill_pipeline(
        slack,
        importer,
        &config.collector,
        Arc::clone(&collector_metrics),
        cancel,
    )
    .await?;

    let counters = collector_metrics.snapshot();
    info!(
        "Process stopped successfully, {} messages imported, {} failed, {} collection errors",
        summary.imported, summary.failed, counters.errors
    );
    info!("Elapsed time: {:?}", started.elapsed());
    Ok(())
}
