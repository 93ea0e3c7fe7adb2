// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod backfill;
pub mod batch_buffer;
pub mod channels;
pub mod classifier;
pub mod config;
pub mod error;
pub mod event;
pub mod http_utils;
pub mod live;
pub mod metrics;
pub mod record;
pub mod slack;
pub mod threads;
pub mod transport;
pub mod transporter;
