// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should be on unless explicitly disabled
/// need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub rai: RaiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier: "openai" | "azure" | "mock".
    pub provider: String,
    /// Model name forwarded to the provider API.
    pub name: String,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files.
    pub api_key: Option<String>,
    /// Base URL override.  Useful for local proxies or OpenAI-compatible
    /// servers.  For hosted providers the correct default is auto-selected.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion.
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0).  The planner always overrides this
    /// to 0 for deterministic plans.
    pub temperature: Option<f32>,

    // ── Azure OpenAI ─────────────────────────────────────────────────────────
    /// Azure resource name (the subdomain of `.openai.azure.com`).
    /// Required when provider = "azure" and base_url is not set.
    pub azure_resource: Option<String>,
    /// Azure deployment name.  Defaults to `model.name` when not set.
    pub azure_deployment: Option<String>,
    /// Azure REST API version string, e.g. `"2024-06-01"`.
    pub azure_api_version: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
            azure_resource: None,
            azure_deployment: None,
            azure_api_version: None,
        }
    }
}

impl ModelConfig {
    /// Resolve the API key: explicit value wins, then the configured env
    /// var, then the provider's conventional env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }
        if let Some(var) = &self.api_key_env {
            if let Ok(v) = std::env::var(var) {
                return Some(v);
            }
        }
        let fallback = match self.provider.as_str() {
            "azure" => "AZURE_OPENAI_API_KEY",
            _ => "OPENAI_API_KEY",
        };
        std::env::var(fallback).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to.
    pub listen_addr: String,
    /// Origin allowed by the CORS layer (the frontend site).
    pub frontend_origin: Option<String>,
    /// Header carrying the authenticated user principal id.
    pub principal_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8000".into(),
            frontend_origin: None,
            principal_header: "x-ms-client-principal-id".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend: "memory" | "sqlite".
    pub backend: String,
    /// Database path when backend = "sqlite".
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on model ↔ tool round trips per step execution.
    pub max_tool_rounds: u32,
    /// Upper bound on steps the planner may produce per plan.
    pub max_plan_steps: usize,
    /// Directory of tool catalog JSON files overriding the embedded set.
    pub catalog_dir: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 8,
            max_plan_steps: 6,
            catalog_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaiConfig {
    /// Run the responsible-AI pre-check on incoming task descriptions.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RaiConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
