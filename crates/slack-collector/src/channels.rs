// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;

/// Fixed set of channel ids the collectors are allowed to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelFilter {
    channels: BTreeSet<String>,
}

impl ChannelFilter {
    pub fn new<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ChannelFilter {
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_authorized(&self, channel_id: &str) -> bool {
        self.channels.contains(channel_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
