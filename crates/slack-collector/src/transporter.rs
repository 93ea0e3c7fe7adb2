// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::record::LogRecord;

/// Destination for finished records.
#[async_trait]
pub trait Importer: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn import(&self, record: &LogRecord) -> Result<(), Self::Error>;
}

/// Pumps records from the sink channel into an [`Importer`].
pub struct Transporter<I: ?Sized> {
    importer: Arc<I>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportSummary {
    pub imported: u64,
    pub failed: u64,
}

impl<I> Transporter<I>
where
    I: Importer + ?Sized,
{
    pub fn new(importer: Arc<I>) -> Self {
        Transporter { importer }
    }

    /// Runs until every sender of `records` has been dropped.
    ///
    /// Import failures are logged and never stop the pump.
    pub async fn run(&self, mut records: mpsc::Receiver<LogRecord>) -> TransportSummary {
        let mut summary = TransportSummary::default();
        while let Some(record) = records.recv().await {
            match self.importer.import(&record).await {
                Ok(()) => summary.imported += 1,
                Err(e) => {
                    error!("TRANSPORT | Error importing message to the importer: {e}");
                    summary.failed += 1;
                }
            }
        }
        debug!(
            "TRANSPORT | Record channel closed, {} imported, {} failed",
            summary.imported, summary.failed
        );
        summary
    }
}
