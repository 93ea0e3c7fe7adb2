// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

use slack_collector::metrics::write_counter;

const DESTINATION: &str = "destination=\"vlogs\"";

/// Delivery attempts and failures towards VictoriaLogs.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    deliveries: AtomicU64,
    errors: AtomicU64,
}

impl DeliveryMetrics {
    pub fn inc_deliveries(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn write_prometheus(&self, out: &mut String) {
        write_counter(
            out,
            "slack2logs_messages_delivery_total",
            DESTINATION,
            self.deliveries(),
        );
        write_counter(
            out,
            "slack2logs_delivery_errors_total",
            DESTINATION,
            self.errors(),
        );
    }
}
