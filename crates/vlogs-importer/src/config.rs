// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use slack_collector::config::env_secs;

use crate::error::ImportError;

pub const DEFAULT_VLOGS_ADDR: &str = "http://localhost:9428";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// VictoriaLogs connection settings
#[derive(Debug, Clone)]
pub struct VlogsConfig {
    /// Base address, same as `-httpListenAddr` of the VictoriaLogs instance
    pub addr: String,
    /// Basic auth user
    pub user: Option<String>,
    /// Basic auth password; requires `user`
    pub password: Option<String>,
    pub timeout: Duration,
    pub https_proxy: Option<String>,
}

impl Default for VlogsConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_VLOGS_ADDR.to_string(),
            user: None,
            password: None,
            timeout: DEFAULT_TIMEOUT,
            https_proxy: None,
        }
    }
}

impl VlogsConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ImportError> {
        let defaults = Self::default();
        let config = Self {
            addr: env::var("VLOGS_ADDR")
                .map(|val| val.trim_end_matches('/').to_string())
                .unwrap_or(defaults.addr),
            user: non_empty_var("VLOGS_USER"),
            password: non_empty_var("VLOGS_PASSWORD"),
            timeout: env_secs("VLOGS_TIMEOUT_SECS", defaults.timeout)
                .map_err(|e| ImportError::Config(e.to_string()))?,
            https_proxy: env::var("HTTPS_PROXY").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.addr.trim().is_empty() {
            return Err(ImportError::Config("VLOGS_ADDR cannot be empty".to_string()));
        }
        if self.password.is_some() && self.user.is_none() {
            return Err(ImportError::Config(
                "missing `username` for basic authorization".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ImportError::Config(
                "import timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|val| !val.is_empty())
}
