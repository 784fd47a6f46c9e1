// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Request and response bodies for the HTTP surface.  Feedback and
//! clarification requests reuse the in-process message types directly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct InputTaskRequest {
    /// Generated when not provided.
    #[serde(default)]
    pub session_id: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputTaskResponse {
    pub status: String,
    pub session_id: String,
    pub plan_id: String,
    pub description: String,
}

/// Answer for a task the responsible-AI gate refused.
#[derive(Debug, Clone, Serialize)]
pub struct RefusedResponse {
    pub status: String,
}

impl RefusedResponse {
    pub fn plan_not_created() -> Self {
        Self {
            status: "Plan not created".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackResponse {
    pub status: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlansQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}
