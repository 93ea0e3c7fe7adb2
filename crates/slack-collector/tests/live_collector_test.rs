// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::helpers::{edited, envelope, posted};
use common::mocks::{MockSlack, ScriptedEvents};
use slack_collector::channels::ChannelFilter;
use slack_collector::event::SocketEvent;
use slack_collector::live::{LiveCollector, LiveState};
use slack_collector::metrics::CollectorMetrics;
use slack_collector::record::LogRecord;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

const LONG_INTERVAL: Duration = Duration::from_secs(3600);

fn collector(
    events: ScriptedEvents,
    metrics: &Arc<CollectorMetrics>,
    interval: Duration,
) -> LiveCollector<ScriptedEvents, MockSlack> {
    LiveCollector::new(
        events,
        Arc::new(MockSlack::default()),
        Arc::new(ChannelFilter::new(["C1"])),
        Arc::clone(metrics),
        interval,
    )
}

async fn drain(mut rx: mpsc::Receiver<LogRecord>) -> Vec<LogRecord> {
    let mut records = Vec::new();
    while let Some(record) = rx.recv().await {
        records.push(record);
    }
    records
}

#[tokio::test]
#[traced_test]
async fn live_collector_collapses_edits_and_flushes_on_stream_end() {
    let (events, tx, acks) = ScriptedEvents::new(false);
    let metrics = Arc::new(CollectorMetrics::default());
    let live = collector(events, &metrics, LONG_INTERVAL);
    let (sink, rx) = mpsc::channel(16);

    tx.send(envelope("e1", posted("C1", "hello team", "1700000000.000100")))
        .await
        .unwrap();
    tx.send(envelope("e2", posted("C1", "second", "1700000001.000100")))
        .await
        .unwrap();
    tx.send(envelope(
        "e3",
        edited("C1", "1700000000.000100", "hello team!", "1700000050.000100"),
    ))
    .await
    .unwrap();
    drop(tx);

    live.run(sink, CancellationToken::new()).await.unwrap();

    let mut records = drain(rx).await;
    records.sort_by(|a, b| a.thread_ts.cmp(&b.thread_ts));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].text, "hello team!");
    assert_eq!(records[0].thread_ts, "1700000000.000100");
    assert_eq!(records[0].channel_name, "C1-name");
    assert_eq!(records[1].text, "second");

    assert_eq!(*acks.lock().unwrap(), vec!["e1", "e2", "e3"]);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.messages_received, 3);
    assert_eq!(snapshot.messages_out, 2);
    assert_eq!(snapshot.errors, 0);
}

#[tokio::test]
#[traced_test]
async fn live_collector_rejects_unauthorized_channels() {
    let (events, tx, acks) = ScriptedEvents::new(false);
    let metrics = Arc::new(CollectorMetrics::default());
    let live = collector(events, &metrics, LONG_INTERVAL);
    let (sink, rx) = mpsc::channel(16);

    tx.send(envelope("e1", posted("C9", "secret", "1700000000.000100")))
        .await
        .unwrap();
    drop(tx);

    live.run(sink, CancellationToken::new()).await.unwrap();

    assert!(drain(rx).await.is_empty());
    assert!(acks.lock().unwrap().is_empty());
    assert_eq!(metrics.snapshot().errors, 1);
    assert!(logs_contain("got message from unauthorized channel id: C9"));
}

#[tokio::test]
async fn live_collector_skips_join_notices_and_other_envelopes() {
    let (events, tx, acks) = ScriptedEvents::new(false);
    let metrics = Arc::new(CollectorMetrics::default());
    let live = collector(events, &metrics, LONG_INTERVAL);
    let (sink, rx) = mpsc::channel(16);

    tx.send(SocketEvent::Connected).await.unwrap();
    tx.send(SocketEvent::Other("interactive".to_string()))
        .await
        .unwrap();
    tx.send(envelope(
        "e1",
        posted(
            "C1",
            "<@U0787V2AW9W> has joined the channel",
            "1700000000.000100",
        ),
    ))
    .await
    .unwrap();
    drop(tx);

    live.run(sink, CancellationToken::new()).await.unwrap();

    assert!(drain(rx).await.is_empty());
    assert_eq!(*acks.lock().unwrap(), vec!["e1"]);
    assert_eq!(metrics.snapshot().errors, 0);
}

#[tokio::test]
#[traced_test]
async fn live_collector_counts_ack_failures_and_keeps_going() {
    let (events, tx, _acks) = ScriptedEvents::new(true);
    let metrics = Arc::new(CollectorMetrics::default());
    let live = collector(events, &metrics, LONG_INTERVAL);
    let (sink, rx) = mpsc::channel(16);

    tx.send(envelope("e1", posted("C1", "one", "1700000000.000100")))
        .await
        .unwrap();
    tx.send(envelope("e2", posted("C1", "two", "1700000001.000100")))
        .await
        .unwrap();
    drop(tx);

    live.run(sink, CancellationToken::new()).await.unwrap();

    assert_eq!(drain(rx).await.len(), 2);
    assert_eq!(metrics.snapshot().errors, 2);
    assert!(logs_contain("Failed to acknowledge envelope e1"));
}

#[tokio::test]
async fn live_collector_drains_and_closes_sink_on_cancel() {
    let (events, tx, acks) = ScriptedEvents::new(false);
    let metrics = Arc::new(CollectorMetrics::default());
    let live = collector(events, &metrics, LONG_INTERVAL);
    let mut state = live.subscribe_state();
    let (sink, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(live.run(sink, cancel.clone()));
    tx.send(envelope("e1", posted("C1", "before shutdown", "1700000000.000100")))
        .await
        .unwrap();
    while acks.lock().unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(*state.borrow_and_update(), LiveState::Running);

    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(*state.borrow(), LiveState::Stopped);
    let records = drain(rx).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "before shutdown");
    assert_eq!(metrics.snapshot().messages_out, 1);
}

#[tokio::test(start_paused = true)]
async fn live_collector_flushes_on_interval() {
    let (events, tx, acks) = ScriptedEvents::new(false);
    let metrics = Arc::new(CollectorMetrics::default());
    let live = collector(events, &metrics, Duration::from_secs(10));
    let (sink, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(live.run(sink, cancel.clone()));
    tx.send(envelope("e1", posted("C1", "tick", "1700000000.000100")))
        .await
        .unwrap();
    while acks.lock().unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    tokio::time::sleep(Duration::from_secs(11)).await;
    let record = rx.try_recv().expect("record flushed by the ticker");
    assert_eq!(record.text, "tick");
    assert_eq!(metrics.snapshot().messages_out, 1);

    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert!(rx.recv().await.is_none());
}
