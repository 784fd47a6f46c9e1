// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The HTTP node: a thin axum surface over the session runtimes.
//!
//! Handlers persist the initiating mutation before answering; specialist
//! execution continues asynchronously and becomes visible through the read
//! endpoints.

mod dto;
mod error;
mod node;
mod rai;
mod routes;

pub use dto::*;
pub use error::NodeError;
pub use node::run;
pub use rai::RaiGate;
pub use routes::{router, AppState};
