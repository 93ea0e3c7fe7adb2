// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing::error;

use slack2logs::config::{log_level_from_env, RelayConfig};
use slack2logs::{logger, relay, signals};

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = log_level_from_env();
    if let Err(e) = logger::init(&log_level) {
        eprintln!("could not set up logging with level {log_level:?}: {e}");
        return ExitCode::FAILURE;
    }

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating config on slack2logs-backfill startup: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    signals::cancel_on_shutdown_signal(cancel.clone());

    match relay::run_backfill(config, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
