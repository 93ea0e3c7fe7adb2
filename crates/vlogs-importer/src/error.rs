// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("incorrect import address defined {addr}: {reason}")]
    InvalidAddr { addr: String, reason: String },

    #[error("error marshal message when importing: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unexpected error when performing request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected response code {status}: {body}")]
    Status { status: u16, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_carries_body() {
        let err = ImportError::Status {
            status: 400,
            body: "cannot parse json line".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unexpected response code 400: cannot parse json line"
        );
    }
}
