// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the live, backfill and thread collectors.
#[derive(Debug, Default)]
pub struct CollectorMetrics {
    messages_received: AtomicU64,
    messages_out: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorSnapshot {
    pub messages_received: u64,
    pub messages_out: u64,
    pub errors: u64,
}

impl CollectorMetrics {
    pub fn inc_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_out(&self, n: u64) {
        self.messages_out.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> CollectorSnapshot {
        CollectorSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Appends the counters in Prometheus text exposition format.
    pub fn write_prometheus(&self, out: &mut String) {
        let snapshot = self.snapshot();
        write_counter(
            out,
            "slack2logs_messages_received_total",
            "source=\"slack\"",
            snapshot.messages_received,
        );
        write_counter(
            out,
            "slack2logs_messages_out_total",
            "source=\"slack\"",
            snapshot.messages_out,
        );
        write_counter(
            out,
            "slack2logs_errors_total",
            "source=\"slack\"",
            snapshot.errors,
        );
    }
}

/// Writes one counter sample with its TYPE line.
pub fn write_counter(out: &mut String, name: &str, labels: &str, value: u64) {
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name}{{{labels}}} {value}");
}
