// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use slack_collector::config::{env_secs, CollectorConfig};
use vlogs_importer::VlogsConfig;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_HTTP_LISTEN_ADDR: &str = "0.0.0.0:8420";
pub const DEFAULT_HTTP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub collector: CollectorConfig,
    pub vlogs: VlogsConfig,
    pub http_listen_addr: SocketAddr,
    /// Upper bound for draining open HTTP connections on shutdown
    pub http_shutdown_timeout: Duration,
    pub log_level: String,
}

impl RelayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let collector = CollectorConfig::from_env().context("invalid slack configuration")?;
        let vlogs = VlogsConfig::from_env().context("invalid VictoriaLogs configuration")?;

        let raw_addr = env::var("SLACK2LOGS_HTTP_LISTEN_ADDR")
            .unwrap_or_else(|_| DEFAULT_HTTP_LISTEN_ADDR.to_string());
        let http_listen_addr = parse_listen_addr(&raw_addr)?;
        let http_shutdown_timeout = env_secs(
            "SLACK2LOGS_HTTP_SHUTDOWN_TIMEOUT_SECS",
            DEFAULT_HTTP_SHUTDOWN_TIMEOUT,
        )?;

        let config = RelayConfig {
            collector,
            vlogs,
            http_listen_addr,
            http_shutdown_timeout,
            log_level: log_level_from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_log_level(&self.log_level)?;
        if self.http_shutdown_timeout.is_zero() {
            return Err(anyhow!("http shutdown timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// Read before anything else so that configuration errors get logged.
#[must_use]
pub fn log_level_from_env() -> String {
    env::var("SLACK2LOGS_LOG_LEVEL")
        .map(|val| val.trim().to_lowercase())
        .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}

pub fn validate_log_level(level: &str) -> anyhow::Result<()> {
    if LOG_LEVELS.contains(&level) {
        Ok(())
    } else {
        Err(anyhow!(
            "invalid log level {level:?}, expected one of {}",
            LOG_LEVELS.join(", ")
        ))
    }
}

/// Accepts `host:port` and the `:port` shorthand.
pub fn parse_listen_addr(raw: &str) -> anyhow::Result<SocketAddr> {
    let raw = raw.trim();
    let full = if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw.to_string()
    };
    full.parse()
        .with_context(|| format!("invalid http listen address {raw:?}"))
}
