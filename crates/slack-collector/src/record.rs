// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Canonical log records emitted by every collector.

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ClassifyError;
use crate::event::Message;
use crate::transport::UserInfo;

/// Length of the hex prefix used as the thread identifier.
pub const THREAD_ID_LEN: usize = 10;

/// A single Slack message normalized for storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub thread_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub user: String,
    pub text: String,
    pub thread_ts: String,
    /// RFC 3339, UTC, whole seconds.
    pub ts: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub display_name: String,
    pub display_name_normalized: String,
}

impl LogRecord {
    /// Builds a record from an already-resolved message.
    ///
    /// `thread_ts` must be the thread root timestamp; it also seeds the thread id.
    pub fn build(
        message: &Message,
        thread_ts: &str,
        channel_id: &str,
        channel_name: &str,
        user: &UserInfo,
    ) -> Result<Self, ClassifyError> {
        let ts = format_timestamp(&message.ts)?;
        Ok(LogRecord {
            thread_id: thread_id(thread_ts),
            kind: message.kind.clone(),
            user: message.user.clone(),
            text: message.text.clone(),
            thread_ts: thread_ts.to_string(),
            ts,
            channel_id: channel_id.to_string(),
            channel_name: channel_name.to_string(),
            user_id: user.id.clone(),
            display_name: user.display_name.clone(),
            display_name_normalized: user.display_name_normalized.clone(),
        })
    }
}

/// Root of a thread to fetch replies for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRequest {
    pub channel_id: String,
    pub ts: String,
}

/// Stable identifier shared by every message of a thread.
#[must_use]
pub fn thread_id(thread_ts: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(thread_ts.as_bytes());
    let encoded = hex::encode(hasher.finalize());
    encoded[..THREAD_ID_LEN].to_string()
}

/// Converts a Slack `"seconds.micros"` timestamp into RFC 3339.
///
/// The fractional part is truncated.
pub fn format_timestamp(raw: &str) -> Result<String, ClassifyError> {
    let parse_error = || ClassifyError::TimestampParse {
        ts: raw.to_string(),
    };
    let seconds: f64 = raw.trim().parse().map_err(|_| parse_error())?;
    if !seconds.is_finite() {
        return Err(parse_error());
    }
    #[allow(clippy::cast_possible_truncation)]
    let datetime = DateTime::from_timestamp(seconds.trunc() as i64, 0).ok_or_else(parse_error)?;
    Ok(datetime.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_thread_id_is_truncated_sha256() {
        let id = thread_id("1712345678.000100");
        assert_eq!(id.len(), THREAD_ID_LEN);
        assert_eq!(id, thread_id("1712345678.000100"));
        assert_ne!(id, thread_id("1712345678.000101"));
    }

    #[test]
    fn test_thread_id_of_empty_string() {
        assert_eq!(thread_id(""), "e3b0c44298");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp("1700000000.123456").unwrap(),
            "2023-11-14T22:13:20Z"
        );
        assert_eq!(format_timestamp("0").unwrap(), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_format_timestamp_rejects_garbage() {
        for raw in ["", "abc", "NaN", "inf", "1e300"] {
            let err = format_timestamp(raw).unwrap_err();
            assert!(
                matches!(err, ClassifyError::TimestampParse { .. }),
                "{raw} should not parse"
            );
        }
    }

    #[test]
    fn test_record_serializes_with_wire_names() {
        let message = Message {
            kind: "message".to_string(),
            user: "U1".to_string(),
            text: "hello".to_string(),
            ts: "1700000000.000200".to_string(),
            ..Default::default()
        };
        let user = UserInfo {
            id: "U1".to_string(),
            display_name: "Alice".to_string(),
            display_name_normalized: "alice".to_string(),
        };
        let record =
            LogRecord::build(&message, "1700000000.000100", "C1", "general", &user).unwrap();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["type"], "message");
        assert_eq!(json["thread_ts"], "1700000000.000100");
        assert_eq!(json["thread_id"], thread_id("1700000000.000100"));
        assert_eq!(json["ts"], "2023-11-14T22:13:20Z");
        assert_eq!(json["channel_name"], "general");
        assert_eq!(json["display_name_normalized"], "alice");
    }

    proptest! {
        #[test]
        fn test_thread_id_is_fixed_length_hex(ts in ".*") {
            let id = thread_id(&ts);
            prop_assert_eq!(id.len(), THREAD_ID_LEN);
            prop_assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
            prop_assert_eq!(id, thread_id(&ts));
        }
    }
}
