// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for building test events

use slack_collector::event::{InboundEvent, Message, MessageChangedEvent, MessageEvent, SocketEvent};

#[allow(dead_code)]
pub fn message(user: &str, text: &str, ts: &str) -> Message {
    Message {
        kind: "message".to_string(),
        user: user.to_string(),
        text: text.to_string(),
        ts: ts.to_string(),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn reply(user: &str, text: &str, ts: &str, thread_ts: &str) -> Message {
    Message {
        thread_ts: Some(thread_ts.to_string()),
        ..message(user, text, ts)
    }
}

#[allow(dead_code)]
pub fn envelope(envelope_id: &str, event: InboundEvent) -> SocketEvent {
    SocketEvent::EventsApi {
        envelope_id: envelope_id.to_string(),
        event,
    }
}

#[allow(dead_code)]
pub fn posted(channel: &str, text: &str, ts: &str) -> InboundEvent {
    InboundEvent::Message(MessageEvent {
        channel: channel.to_string(),
        message: message("U1", text, ts),
    })
}

#[allow(dead_code)]
pub fn edited(channel: &str, original_ts: &str, new_text: &str, edit_ts: &str) -> InboundEvent {
    InboundEvent::MessageChanged(MessageChangedEvent {
        kind: "message".to_string(),
        channel: channel.to_string(),
        ts: edit_ts.to_string(),
        message: message("U1", new_text, original_ts),
        previous_message: message("U1", "", original_ts),
    })
}
