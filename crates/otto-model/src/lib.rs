// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Model gateway: chat completion with tool calling and schema-constrained
//! output, behind a single [`ModelProvider`] trait.
//!
//! Drivers:
//! - [`OpenAICompatProvider`] — OpenAI and Azure OpenAI wire formats
//! - [`MockProvider`] / [`ScriptedMockProvider`] — deterministic test doubles

mod error;
pub mod mock;
mod openai_compat;
mod provider;
mod types;

pub use error::ModelError;
pub use mock::{MockProvider, ScriptedMockProvider};
pub use openai_compat::{AuthStyle, OpenAICompatProvider};
pub use provider::{from_config, ModelProvider};
pub use types::*;
