// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Deterministic mock providers for tests and credential-free local runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{CompletionRequest, CompletionResponse, ModelError, Role, Usage};

/// Echo mock: replies with the last user message.  Used when the configured
/// provider is `"mock"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, ModelError> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .and_then(|m| m.as_text())
            .unwrap_or("[no input]")
            .to_string();
        Ok(CompletionResponse {
            content: format!("MOCK: {reply}"),
            tool_calls: vec![],
            usage: Usage {
                input_tokens: 10,
                output_tokens: 10,
            },
        })
    }
}

/// A pre-scripted mock provider.  Each call to `complete` pops the next
/// response from the front of the queue, so tests can specify exact turn
/// sequences — including tool calls — without network access.
#[derive(Debug)]
pub struct ScriptedMockProvider {
    scripts: Mutex<VecDeque<Result<CompletionResponse, ModelError>>>,
    /// Every request seen by this provider, in call order.
    /// Tests inspect this to assert on prompts and tool schemas.
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedMockProvider {
    /// Build a provider from an ordered list of scripted turns.
    pub fn new(scripts: Vec<CompletionResponse>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().map(Ok).collect()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Build a provider whose turns may also be errors.
    pub fn with_results(scripts: Vec<Result<CompletionResponse, ModelError>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![CompletionResponse::text(reply)])
    }

    /// Convenience: a tool call followed by a text reply.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            CompletionResponse::tool_call(tool_id, tool_name, args_json),
            CompletionResponse::text(final_text),
        ])
    }

    /// The request captured for the most recent call, if any.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Number of completed calls so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, ModelError> {
        self.requests.lock().unwrap().push(req);
        let next = self.scripts.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            // Default fallback when all scripts are consumed.
            None => Ok(CompletionResponse::text("[no more scripts]")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
