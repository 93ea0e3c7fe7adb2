// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Inbound Slack events, decoded once at the transport boundary.
//!
//! Socket Mode delivers JSON envelopes. Only `events_api` envelopes carry
//! messages; their inner event is narrowed to [`InboundEvent`]. Everything
//! the collectors do not understand becomes an explicit `Unsupported` or
//! `Other` variant rather than an error.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::TransportError;

pub const MESSAGE_CHANGED_SUBTYPE: &str = "message_changed";

/// A message as returned by the Events API and the history endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub subtype: Option<String>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub thread_ts: Option<String>,
}

/// A new message posted to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub channel: String,
    #[serde(flatten)]
    pub message: Message,
}

/// An edit of an existing message (`subtype: message_changed`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageChangedEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub channel: String,
    /// Time of the edit event itself.
    #[serde(default)]
    pub ts: String,
    /// The message after the edit.
    #[serde(default)]
    pub message: Message,
    /// The message before the edit.
    #[serde(default)]
    pub previous_message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(MessageEvent),
    MessageChanged(MessageChangedEvent),
    Unsupported(String),
}

impl InboundEvent {
    pub fn channel(&self) -> Option<&str> {
        match self {
            InboundEvent::Message(event) => Some(&event.channel),
            InboundEvent::MessageChanged(event) => Some(&event.channel),
            InboundEvent::Unsupported(_) => None,
        }
    }

    /// Narrows an Events API `event_callback` payload.
    pub fn from_payload(payload: &Value) -> Result<Self, TransportError> {
        let payload_type = payload.get("type").and_then(Value::as_str).unwrap_or("");
        if payload_type != "event_callback" {
            return Ok(InboundEvent::Unsupported(payload_type.to_string()));
        }
        let Some(event) = payload.get("event") else {
            return Err(TransportError::Decode(
                "event_callback without event".to_string(),
            ));
        };
        let event_type = event.get("type").and_then(Value::as_str).unwrap_or("");
        if event_type != "message" {
            return Ok(InboundEvent::Unsupported(event_type.to_string()));
        }

        let subtype = event.get("subtype").and_then(Value::as_str);
        if subtype == Some(MESSAGE_CHANGED_SUBTYPE) {
            MessageChangedEvent::deserialize(event)
                .map(InboundEvent::MessageChanged)
                .map_err(|e| TransportError::Decode(e.to_string()))
        } else {
            MessageEvent::deserialize(event)
                .map(InboundEvent::Message)
                .map_err(|e| TransportError::Decode(e.to_string()))
        }
    }
}

/// One Socket Mode frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Emitted by the client before each (re)connection attempt.
    Connecting,
    /// The server's `hello` envelope.
    Connected,
    EventsApi {
        envelope_id: String,
        event: InboundEvent,
    },
    Disconnect {
        reason: String,
    },
    Other(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    reason: Option<String>,
}

impl SocketEvent {
    /// Decodes a text frame received over the Socket Mode websocket.
    pub fn from_frame(frame: &str) -> Result<Self, TransportError> {
        let envelope: Envelope =
            serde_json::from_str(frame).map_err(|e| TransportError::Decode(e.to_string()))?;

        match envelope.kind.as_str() {
            "hello" => Ok(SocketEvent::Connected),
            "disconnect" => Ok(SocketEvent::Disconnect {
                reason: envelope.reason.unwrap_or_default(),
            }),
            "events_api" => {
                let envelope_id = envelope.envelope_id.ok_or_else(|| {
                    TransportError::Decode("events_api envelope without envelope_id".to_string())
                })?;
                let event = match envelope.payload {
                    Some(payload) => InboundEvent::from_payload(&payload)?,
                    None => InboundEvent::Unsupported(String::new()),
                };
                Ok(SocketEvent::EventsApi { envelope_id, event })
            }
            other => Ok(SocketEvent::Other(other.to_string())),
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}
