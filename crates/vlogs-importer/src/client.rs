// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! VictoriaLogs importer.
//!
//! Each record is posted as one JSON line to `{addr}/insert/jsonline`. The
//! query string tells VictoriaLogs which fields form the stream, which one is
//! the message and which one carries the time.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use slack_collector::http_utils::build_client;
use slack_collector::record::LogRecord;
use slack_collector::transporter::Importer;
use tracing::debug;

use crate::config::VlogsConfig;
use crate::error::ImportError;
use crate::metrics::DeliveryMetrics;

const JSON_LINE_PATH: &str = "insert/jsonline";
const STREAM_FIELDS: &str = "channel_id,channel_name";
const MSG_FIELD: &str = "text";
const TIME_FIELD: &str = "ts";

#[derive(Debug, Clone)]
struct BasicAuth {
    user: String,
    password: String,
}

#[derive(Debug, Clone)]
pub struct VlogsClient {
    client: reqwest::Client,
    url: Url,
    auth: Option<BasicAuth>,
    metrics: Arc<DeliveryMetrics>,
}

impl VlogsClient {
    pub fn new(config: &VlogsConfig, metrics: Arc<DeliveryMetrics>) -> Result<Self, ImportError> {
        config.validate()?;
        let client = build_client(config.https_proxy.as_deref(), config.timeout)?;
        Ok(VlogsClient {
            client,
            url: import_url(&config.addr)?,
            auth: basic_auth(config),
            metrics,
        })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn send(&self, record: &LogRecord) -> Result<(), ImportError> {
        let mut body = serde_json::to_vec(record)?;
        body.push(b'\n');

        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.user, Some(&auth.password));
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await?;
            return Err(ImportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!("VLOGS | Imported message {}", record.ts);
        Ok(())
    }
}

#[async_trait]
impl Importer for VlogsClient {
    type Error = ImportError;

    async fn import(&self, record: &LogRecord) -> Result<(), ImportError> {
        self.metrics.inc_deliveries();
        let result = self.send(record).await;
        if result.is_err() {
            self.metrics.inc_errors();
        }
        result
    }
}

fn import_url(addr: &str) -> Result<Url, ImportError> {
    let raw = format!("{}/{JSON_LINE_PATH}", addr.trim_end_matches('/'));
    let mut url = Url::parse(&raw).map_err(|e| ImportError::InvalidAddr {
        addr: addr.to_string(),
        reason: e.to_string(),
    })?;
    url.query_pairs_mut()
        .append_pair("_stream_fields", STREAM_FIELDS)
        .append_pair("_msg_field", MSG_FIELD)
        .append_pair("_time_field", TIME_FIELD);
    Ok(url)
}

/// The header is only sent when a password is set.
fn basic_auth(config: &VlogsConfig) -> Option<BasicAuth> {
    match (&config.user, &config.password) {
        (Some(user), Some(password)) if !password.is_empty() => Some(BasicAuth {
            user: user.clone(),
            password: password.clone(),
        }),
        _ => None,
    }
}
