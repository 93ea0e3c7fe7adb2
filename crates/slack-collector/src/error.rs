// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Errors raised while loading or validating the collector configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Failures reported by the chat transport (Web API or Socket Mode).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("operation cancelled")]
    Cancelled,

    #[error("slack api error: {0}")]
    Api(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode payload: {0}")]
    Decode(String),

    #[error("websocket failure: {0}")]
    WebSocket(String),
}

impl TransportError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TransportError::RateLimited { .. })
    }
}

/// Reasons an inbound message cannot be turned into a record.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("got message from unauthorized channel id: {0}")]
    UnauthorizedChannel(String),

    #[error("failed to parse timestamp {ts:?}")]
    TimestampParse { ts: String },

    #[error("failed to resolve {what} {id:?}: {source}")]
    LookupFailed {
        what: &'static str,
        id: String,
        #[source]
        source: TransportError,
    },

    #[error("classification cancelled")]
    Cancelled,
}

impl ClassifyError {
    pub(crate) fn lookup(what: &'static str, id: &str, source: TransportError) -> Self {
        match source {
            TransportError::Cancelled => ClassifyError::Cancelled,
            source => ClassifyError::LookupFailed {
                what,
                id: id.to_string(),
                source,
            },
        }
    }
}

/// Fatal errors surfaced from a collector's top-level run.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}
