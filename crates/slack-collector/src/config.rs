// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::channels::ChannelFilter;
use crate::error::ConfigError;

pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";
pub const DEFAULT_BATCH_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 500;
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Slack refuses `limit` values above this.
const MAX_HISTORY_PAGE_SIZE: usize = 1000;

/// Configuration for the Slack collectors
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Bot user OAuth token (`xoxb-...`)
    pub bot_token: String,
    /// App-level token (`xapp-...`), required for Socket Mode
    pub app_token: String,
    /// Channel ids to collect messages from
    pub channels: Vec<String>,
    /// How often the live collector flushes its batch buffer
    pub batch_flush_interval: Duration,
    /// `limit` used for history and replies pages
    pub history_page_size: usize,
    /// Delay before retrying a rate-limited call
    pub rate_limit_backoff: Duration,
    /// Capacity of the record sink channel
    pub sink_capacity: usize,
    /// Capacity of the thread request queue
    pub thread_queue_capacity: usize,
    /// Slack Web API base URL
    pub api_url: String,
    pub https_proxy: Option<String>,
    pub request_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            app_token: String::new(),
            channels: Vec::new(),
            batch_flush_interval: DEFAULT_BATCH_FLUSH_INTERVAL,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
            sink_capacity: 1,
            thread_queue_capacity: 1,
            api_url: DEFAULT_SLACK_API_URL.to_string(),
            https_proxy: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl CollectorConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            bot_token: env::var("SLACK_BOT_TOKEN").unwrap_or_default(),
            app_token: env::var("SLACK_APP_TOKEN").unwrap_or_default(),
            channels: env::var("SLACK_CHANNELS")
                .map(|val| parse_channel_list(&val))
                .unwrap_or_default(),
            batch_flush_interval: env_secs(
                "SLACK_BATCH_FLUSH_INTERVAL_SECS",
                defaults.batch_flush_interval,
            )?,
            history_page_size: env_parse("SLACK_HISTORY_PAGE_SIZE", defaults.history_page_size)?,
            rate_limit_backoff: env_secs(
                "SLACK_RATE_LIMIT_BACKOFF_SECS",
                defaults.rate_limit_backoff,
            )?,
            sink_capacity: env_parse("SLACK_SINK_CAPACITY", defaults.sink_capacity)?,
            thread_queue_capacity: env_parse(
                "SLACK_THREAD_QUEUE_CAPACITY",
                defaults.thread_queue_capacity,
            )?,
            api_url: env::var("SLACK_API_URL")
                .map(|val| val.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            https_proxy: env::var("HTTPS_PROXY").ok(),
            request_timeout: defaults.request_timeout,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::Invalid(
                "got 0 slack channels to listen to, at least one channel must be defined in SLACK_CHANNELS".to_string(),
            ));
        }

        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "SLACK_BOT_TOKEN cannot be empty".to_string(),
            ));
        }

        if self.batch_flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "batch flush interval must be greater than 0".to_string(),
            ));
        }

        if self.history_page_size == 0 || self.history_page_size > MAX_HISTORY_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "history page size must be between 1 and {MAX_HISTORY_PAGE_SIZE}"
            )));
        }

        if self.sink_capacity == 0 || self.thread_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel capacities must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn channel_filter(&self) -> ChannelFilter {
        ChannelFilter::new(self.channels.iter().cloned())
    }
}

/// Splits a comma separated list. Values may be wrapped in single or double
/// quotes to carry commas.
#[must_use]
pub fn parse_channel_list(raw: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in raw.chars() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => values.push(std::mem::take(&mut current)),
            (_, c) => current.push(c),
        }
    }
    values.push(current);

    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Reads and parses `name`, falling back to `default` when unset.
pub fn env_parse<T: std::str::FromStr>(
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

pub fn env_secs(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    env_parse(name, default.as_secs()).map(Duration::from_secs)
}
