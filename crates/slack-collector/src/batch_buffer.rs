// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Keyed buffer that collapses edits of the same message between flushes.
//!
//! Records are keyed by their batch key: the original timestamp of the
//! message, even when the event is an edit. A later `put` for the same key
//! replaces the earlier record, so only the latest version of a message is
//! flushed.
//!
//! ```text
//!   put(ts, record) ──> ┌──────────────────┐
//!   put(ts, edited) ──> │ HashMap<ts, rec> │ ──drain_all──> Vec<LogRecord>
//!                       └──────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::error;

use crate::record::LogRecord;

#[derive(Debug, Default)]
pub struct BatchBuffer {
    records: Mutex<HashMap<String, LogRecord>>,
}

impl BatchBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record stored under `key`.
    pub fn put(&self, key: String, record: LogRecord) {
        match self.records.lock() {
            Ok(mut records) => {
                records.insert(key, record);
            }
            Err(e) => {
                error!("SLACK | Batch buffer lock poisoned, dropping record: {e}");
            }
        }
    }

    /// Empties the buffer and returns everything it held.
    ///
    /// The swap happens under the lock, so a concurrent `put` lands either in
    /// the returned batch or in the next one.
    pub fn drain_all(&self) -> Vec<LogRecord> {
        let drained = match self.records.lock() {
            Ok(mut records) => std::mem::take(&mut *records),
            Err(e) => {
                error!("SLACK | Batch buffer lock poisoned, nothing to drain: {e}");
                return Vec::new();
            }
        };
        drained.into_values().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(text: &str) -> LogRecord {
        LogRecord {
            thread_id: "abc".to_string(),
            kind: "message".to_string(),
            user: "U1".to_string(),
            text: text.to_string(),
            thread_ts: "1.0".to_string(),
            ts: "1970-01-01T00:00:01Z".to_string(),
            channel_id: "C1".to_string(),
            channel_name: "general".to_string(),
            user_id: "U1".to_string(),
            display_name: "alice".to_string(),
            display_name_normalized: "alice".to_string(),
        }
    }

    #[test]
    fn test_last_write_wins() {
        let buffer = BatchBuffer::new();
        buffer.put("1.0".to_string(), record("first"));
        buffer.put("1.0".to_string(), record("edited"));

        let drained = buffer.drain_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].text, "edited");
    }

    #[test]
    fn test_drain_empties_buffer() {
        let buffer = BatchBuffer::new();
        buffer.put("1.0".to_string(), record("a"));
        buffer.put("2.0".to_string(), record("b"));
        buffer.put("2.0".to_string(), record("c"));
        buffer.put("3.0".to_string(), record("d"));

        assert_eq!(buffer.drain_all().len(), 3);
        assert!(buffer.is_empty());
        assert!(buffer.drain_all().is_empty());
    }

    #[test]
    fn test_concurrent_puts_are_never_lost() {
        let buffer = Arc::new(BatchBuffer::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        buffer.put(format!("{w}-{i}"), record("x"));
                    }
                })
            })
            .collect();

        let mut total = 0;
        for writer in writers {
            total += buffer.drain_all().len();
            writer.join().unwrap();
        }
        total += buffer.drain_all().len();
        assert_eq!(total, 1000);
    }
}
