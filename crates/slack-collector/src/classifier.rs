// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns inbound message events into [`LogRecord`]s.
//!
//! Thread timestamp precedence:
//! - new message: its `thread_ts`, else its own `ts`;
//! - edit: the previous message's `thread_ts`, else the previous message's
//!   `ts`, else the edited message's `thread_ts` when it differs from its
//!   `ts`, else the edited message's `ts`.
//!
//! The batch key of an edit is the timestamp of the message before the edit,
//! so that the edit replaces the original in the batch buffer.
//!
//! Join notices are recognised on new messages only. An edit envelope has no
//! text of its own, so edits are never treated as notices, whatever the
//! edited text says.

use crate::channels::ChannelFilter;
use crate::error::ClassifyError;
use crate::event::{InboundEvent, Message, MessageChangedEvent, MessageEvent};
use crate::record::LogRecord;
use crate::transport::MetadataLookup;

const JOINED_CHANNEL_SUFFIX: &str = "> has joined the channel";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Record { batch_key: String, record: LogRecord },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// "<@U0787V2AW9W> has joined the channel" style notices.
    JoinNotice,
    Unsupported(String),
}

/// Returns true for "user joined the channel" notices.
#[must_use]
pub fn is_join_notice(text: &str) -> bool {
    text.ends_with(JOINED_CHANNEL_SUFFIX)
}

pub async fn classify<L>(
    event: &InboundEvent,
    filter: &ChannelFilter,
    lookup: &L,
) -> Result<Classified, ClassifyError>
where
    L: MetadataLookup + ?Sized,
{
    let (channel, effective, batch_key, notice) = match event {
        InboundEvent::Unsupported(kind) => {
            return Ok(Classified::Skipped(SkipReason::Unsupported(kind.clone())))
        }
        InboundEvent::Message(MessageEvent { channel, message }) => {
            let mut effective = message.clone();
            effective.thread_ts = Some(
                message
                    .thread_ts
                    .clone()
                    .unwrap_or_else(|| message.ts.clone()),
            );
            let notice = is_join_notice(&message.text);
            (channel, effective, message.ts.clone(), notice)
        }
        InboundEvent::MessageChanged(changed) => (
            &changed.channel,
            resolve_edit(changed),
            changed.previous_message.ts.clone(),
            false,
        ),
    };

    if !filter.is_authorized(channel) {
        return Err(ClassifyError::UnauthorizedChannel(channel.clone()));
    }
    if notice {
        return Ok(Classified::Skipped(SkipReason::JoinNotice));
    }

    let thread_ts = effective.thread_ts.clone().unwrap_or_default();
    // Reject unparsable timestamps before any lookup.
    crate::record::format_timestamp(&effective.ts)?;

    let user = lookup
        .user_info(&effective.user)
        .await
        .map_err(|e| ClassifyError::lookup("user", &effective.user, e))?;
    let channel_info = lookup
        .channel_info(channel)
        .await
        .map_err(|e| ClassifyError::lookup("channel", channel, e))?;

    let record = LogRecord::build(&effective, &thread_ts, channel, &channel_info.name, &user)?;
    Ok(Classified::Record { batch_key, record })
}

/// Folds an edit into the message that should be stored.
///
/// Author and text come from the edited message; `ts` and `type` stay those
/// of the edit event.
fn resolve_edit(changed: &MessageChangedEvent) -> Message {
    let edited = &changed.message;
    let previous = &changed.previous_message;

    let thread_ts = previous
        .thread_ts
        .clone()
        .or_else(|| Some(previous.ts.clone()).filter(|ts| !ts.is_empty()))
        .or_else(|| edited.thread_ts.clone().filter(|ts| *ts != edited.ts))
        .unwrap_or_else(|| edited.ts.clone());

    Message {
        kind: changed.kind.clone(),
        subtype: Some(crate::event::MESSAGE_CHANGED_SUBTYPE.to_string()),
        user: edited.user.clone(),
        text: edited.text.clone(),
        ts: changed.ts.clone(),
        thread_ts: Some(thread_ts),
    }
}
