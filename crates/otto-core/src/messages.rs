// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! In-process messages exchanged between the orchestration components.

use serde::{Deserialize, Serialize};

use otto_store::{AgentName, StepStatus};

/// The initial input task from the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputTask {
    pub session_id: String,
    pub user_id: String,
    pub description: String,
}

/// Carries a step from the Group Chat Manager to its specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub step_id: String,
    pub plan_id: String,
    pub session_id: String,
    /// The action text including the conversation-history preface.
    pub action: String,
    pub agent: AgentName,
}

/// The specialist's reply after performing (or failing) an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub step_id: String,
    pub plan_id: String,
    pub session_id: String,
    pub result: String,
    /// `completed` or `failed`.
    pub status: StepStatus,
}

/// Human feedback on a step (or, without `step_id`, on every open step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub plan_id: String,
    pub session_id: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_action: Option<String>,
}

/// Human clarification on the overall plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanClarification {
    pub plan_id: String,
    pub session_id: String,
    pub human_clarification: String,
}

/// Signal from the Human agent back to the Group Chat Manager that feedback
/// for a step has been recorded and the plan may advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalSignal {
    pub session_id: String,
    pub plan_id: String,
    pub step_id: String,
}
