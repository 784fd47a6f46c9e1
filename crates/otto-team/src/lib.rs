// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Session-level coordination: the Group Chat Manager that routes input,
//! approvals, and action responses, and the Session Runtime that owns one
//! component graph per session.

mod manager;
mod runtime;

pub use manager::GroupChatManager;
pub use runtime::{SessionMap, SessionRuntime};
