// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Shared driver for OpenAI-compatible chat completion APIs.
//!
//! OpenAI and Azure OpenAI speak the same `/chat/completions` wire format;
//! this module provides a single `OpenAICompatProvider` configured with the
//! endpoint URL and auth style.
//!
//! # Auth styles
//! - `Bearer` — `Authorization: Bearer <key>` (OpenAI and compatibles)
//! - `ApiKeyHeader` — `api-key: <key>` (Azure OpenAI)
//! - `None` — no authentication (local servers)

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    CompletionRequest, CompletionResponse, Message, MessageContent, ModelError, ResponseFormat,
    Role, ToolChoice, ToolInvocation, Usage,
};

/// How to send the API key in HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>` — standard for most providers.
    Bearer,
    /// `api-key: <key>` — Azure OpenAI style.
    ApiKeyHeader,
    /// No authentication header — local servers.
    None,
}

/// Retry budget for transient failures (rate limit, transport).
const MAX_TRANSIENT_RETRIES: u32 = 3;
/// Retry budget for schema-constrained responses that fail validation.
const MAX_SCHEMA_RETRIES: u32 = 2;
/// Base delay for exponential backoff.
const BACKOFF_BASE_MS: u64 = 500;

/// OpenAI-compatible chat completion provider.
#[derive(Debug)]
pub struct OpenAICompatProvider {
    /// Provider id returned by `ModelProvider::name()`.
    driver_name: &'static str,
    /// Model id forwarded to the API.
    model: String,
    /// API key (pre-resolved from config or env).
    api_key: Option<String>,
    /// Full chat completions URL.
    chat_url: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
    auth_style: AuthStyle,
}

impl OpenAICompatProvider {
    /// Construct a provider from an API base that ends **before**
    /// `/chat/completions`, e.g. `https://api.openai.com/v1`.
    pub fn new(
        driver_name: &'static str,
        model: String,
        api_key: Option<String>,
        base_url: &str,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        auth_style: AuthStyle,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self::from_chat_url(
            driver_name,
            model,
            api_key,
            format!("{base}/chat/completions"),
            max_tokens,
            temperature,
            auth_style,
        )
    }

    /// Construct a provider from a **pre-built** chat completions URL.
    ///
    /// Use this when the full URL cannot be derived by appending
    /// `/chat/completions` to a base — e.g. Azure OpenAI, which encodes the
    /// deployment name and API version into the path and query string.
    pub fn from_chat_url(
        driver_name: &'static str,
        model: String,
        api_key: Option<String>,
        chat_url: String,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        auth_style: AuthStyle,
    ) -> Self {
        Self {
            driver_name,
            model,
            api_key,
            chat_url,
            max_tokens: max_tokens.unwrap_or(4096),
            temperature: temperature.unwrap_or(0.2),
            client: reqwest::Client::new(),
            auth_style,
        }
    }

    fn build_body(&self, req: &CompletionRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(wire_message).collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": req.max_tokens.unwrap_or(self.max_tokens),
            "temperature": req.temperature.unwrap_or(self.temperature),
        });

        if !req.tools.is_empty() {
            body["tools"] = Value::Array(
                req.tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect(),
            );
            body["tool_choice"] = match &req.tool_choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::Required => json!("required"),
                ToolChoice::Named(name) => json!({
                    "type": "function",
                    "function": { "name": name }
                }),
            };
        }

        if let Some(rf) = &req.response_format {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": rf.name,
                    "schema": rf.schema,
                    "strict": true,
                }
            });
        }

        body
    }

    async fn send_once(&self, body: &Value) -> Result<CompletionResponse, ModelError> {
        let mut request = self.client.post(&self.chat_url).json(body);
        match (&self.auth_style, &self.api_key) {
            (AuthStyle::Bearer, Some(key)) => {
                request = request.header("Authorization", format!("Bearer {key}"));
            }
            (AuthStyle::ApiKeyHeader, Some(key)) => {
                request = request.header("api-key", key);
            }
            _ => {}
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ModelError::RateLimited);
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ModelError::Unauthorized);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::Transport(format!("HTTP {status}: {text}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ModelError::Transport(format!("decoding response: {e}")))?;
        parse_completion(&payload)
    }
}

#[async_trait]
impl crate::ModelProvider for OpenAICompatProvider {
    fn name(&self) -> &str {
        self.driver_name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, ModelError> {
        let body = self.build_body(&req);
        debug!(provider = self.driver_name, model = %self.model, "chat completion request");

        let mut schema_attempts = 0u32;
        loop {
            let response = self.send_with_backoff(&body).await?;

            // Provider-side constrained output is verified locally: the
            // content must parse as a JSON object carrying the schema's
            // top-level required keys.
            if let Some(rf) = &req.response_format {
                if let Err(reason) = validate_against_schema(&response.content, rf) {
                    schema_attempts += 1;
                    if schema_attempts > MAX_SCHEMA_RETRIES {
                        return Err(ModelError::Schema(reason));
                    }
                    warn!(
                        provider = self.driver_name,
                        attempt = schema_attempts,
                        "schema validation failed, retrying: {reason}"
                    );
                    continue;
                }
            }
            return Ok(response);
        }
    }
}

impl OpenAICompatProvider {
    async fn send_with_backoff(&self, body: &Value) -> Result<CompletionResponse, ModelError> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(body).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < MAX_TRANSIENT_RETRIES => {
                    let delay = BACKOFF_BASE_MS * (1 << attempt);
                    warn!(
                        provider = self.driver_name,
                        attempt,
                        delay_ms = delay,
                        "transient model error, backing off: {e}"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Serialize one message into the chat-completions wire shape.
fn wire_message(message: &Message) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    match &message.content {
        MessageContent::Text(text) => json!({ "role": role, "content": text }),
        MessageContent::ToolCall {
            tool_call_id,
            function,
        } => json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": [{
                "id": tool_call_id,
                "type": "function",
                "function": {
                    "name": function.name,
                    "arguments": function.arguments,
                }
            }]
        }),
        MessageContent::ToolResult {
            tool_call_id,
            content,
        } => json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "content": content,
        }),
    }
}

/// Parse a chat-completions response body into a [`CompletionResponse`].
fn parse_completion(payload: &Value) -> Result<CompletionResponse, ModelError> {
    let message = payload
        .pointer("/choices/0/message")
        .ok_or_else(|| ModelError::Transport("response has no choices[0].message".into()))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    Some(ToolInvocation {
                        id: c.get("id")?.as_str()?.to_string(),
                        name: c.pointer("/function/name")?.as_str()?.to_string(),
                        arguments: c
                            .pointer("/function/arguments")?
                            .as_str()
                            .unwrap_or("{}")
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let usage = Usage {
        input_tokens: payload
            .pointer("/usage/prompt_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        output_tokens: payload
            .pointer("/usage/completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
    };

    Ok(CompletionResponse {
        content,
        tool_calls,
        usage,
    })
}

/// Check that `content` parses as a JSON object carrying the schema's
/// top-level `required` keys.  Full JSON-schema validation is left to the
/// consumer, which deserializes into typed structs anyway.
fn validate_against_schema(content: &str, rf: &ResponseFormat) -> Result<(), String> {
    let value: Value =
        serde_json::from_str(content).map_err(|e| format!("content is not JSON: {e}"))?;
    let object = value
        .as_object()
        .ok_or_else(|| "content is not a JSON object".to_string())?;

    if let Some(required) = rf.schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(format!("missing required key: {key}"));
            }
        }
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
