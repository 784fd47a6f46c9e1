// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;

use otto_config::ModelConfig;

use crate::{
    openai_compat::{AuthStyle, OpenAICompatProvider},
    CompletionRequest, CompletionResponse, ModelError,
};

#[async_trait]
pub trait ModelProvider: Send + Sync + std::fmt::Debug {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return the completed turn.
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, ModelError>;
}

/// Build a provider from configuration.
///
/// `"mock"` resolves to the echo mock so local runs and tests never need
/// credentials.  Hosted providers fail here when no API key can be resolved,
/// which callers treat as fatal at startup.
pub fn from_config(config: &ModelConfig) -> anyhow::Result<Arc<dyn ModelProvider>> {
    match config.provider.as_str() {
        "mock" => Ok(Arc::new(crate::mock::MockProvider)),
        "openai" => {
            let api_key = config
                .resolve_api_key()
                .ok_or_else(|| anyhow::anyhow!("no API key configured for provider 'openai'"))?;
            Ok(Arc::new(OpenAICompatProvider::new(
                "openai",
                config.name.clone(),
                Some(api_key),
                config
                    .base_url
                    .as_deref()
                    .unwrap_or("https://api.openai.com/v1"),
                config.max_tokens,
                config.temperature,
                AuthStyle::Bearer,
            )))
        }
        "azure" => {
            let api_key = config
                .resolve_api_key()
                .ok_or_else(|| anyhow::anyhow!("no API key configured for provider 'azure'"))?;
            let resource = config.azure_resource.as_deref().ok_or_else(|| {
                anyhow::anyhow!("model.azure_resource is required for provider 'azure'")
            })?;
            let deployment = config.azure_deployment.as_deref().unwrap_or(&config.name);
            let api_version = config
                .azure_api_version
                .as_deref()
                .unwrap_or("2024-06-01");
            let chat_url = format!(
                "https://{resource}.openai.azure.com/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
            );
            Ok(Arc::new(OpenAICompatProvider::from_chat_url(
                "azure",
                config.name.clone(),
                Some(api_key),
                chat_url,
                config.max_tokens,
                config.temperature,
                AuthStyle::ApiKeyHeader,
            )))
        }
        other => anyhow::bail!("unknown model provider: {other}"),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
