// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Slack implementations of the transport traits.

pub mod socket_mode;
pub mod web;

pub use socket_mode::{ConnectionOpener, SocketModeClient};
pub use web::SlackWebClient;
