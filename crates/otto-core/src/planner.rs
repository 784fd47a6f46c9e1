// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The Planner: turns an objective into a persisted plan of specialist-
//! tagged steps.
//!
//! Model output drifts between schema-valid JSON, fenced JSON, and prose,
//! so parsing is a ladder: direct parse → fenced code block → embedded
//! object extraction → free-text reconstruction.  When every rung fails a
//! minimal two-step fallback plan is created; plan creation never silently
//! fails.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use otto_model::{CompletionRequest, Message, ModelProvider, ResponseFormat};
use otto_store::{AgentMessage, AgentName, Plan, Step, Store};
use otto_tools::ToolCatalogRow;

use crate::{prompts, HumanClarification, InputTask};

/// The response structure the model is asked to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerResponsePlan {
    pub initial_goal: String,
    pub steps: Vec<PlannerResponseStep>,
    pub summary_plan_and_steps: String,
    #[serde(default)]
    pub human_clarification_request: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerResponseStep {
    pub action: String,
    /// Kept as a string so lenient agent-name parsing can run after the
    /// schema parse; unknown names fall back to the generic specialist.
    pub agent: String,
}

pub struct Planner {
    model: Arc<dyn ModelProvider>,
    store: Arc<dyn Store>,
    user_id: String,
    available_agents: Vec<AgentName>,
    tool_rows: Vec<ToolCatalogRow>,
    max_plan_steps: usize,
}

impl Planner {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        store: Arc<dyn Store>,
        user_id: impl Into<String>,
        available_agents: Vec<AgentName>,
        tool_rows: Vec<ToolCatalogRow>,
        max_plan_steps: usize,
    ) -> Self {
        Self {
            model,
            store,
            user_id: user_id.into(),
            available_agents,
            tool_rows,
            max_plan_steps,
        }
    }

    /// Create a plan and its steps from the input task, then announce it.
    pub async fn handle_input_task(&self, task: &InputTask) -> anyhow::Result<Plan> {
        let (plan, steps) = self.create_structured_plan(task).await?;

        if !steps.is_empty() {
            self.store
                .add_agent_message(AgentMessage::new(
                    &task.session_id,
                    &self.user_id,
                    &plan.id,
                    AgentName::Planner.as_str(),
                    format!(
                        "Generated a plan with {} steps. Click the blue check box beside each \
                         step to complete it, click the x to remove this step.",
                        steps.len()
                    ),
                ))
                .await?;

            if let Some(request) = &plan.human_clarification_request {
                self.store
                    .add_agent_message(AgentMessage::new(
                        &task.session_id,
                        &self.user_id,
                        &plan.id,
                        AgentName::Planner.as_str(),
                        format!(
                            "I require additional information before we can proceed: {request}"
                        ),
                    ))
                    .await?;
            }
        }

        info!(
            session_id = %task.session_id,
            plan_id = %plan.id,
            steps = steps.len(),
            "plan created"
        );
        Ok(plan)
    }

    /// Record the user's clarification on the plan and acknowledge it.
    pub async fn handle_plan_clarification(
        &self,
        msg: &HumanClarification,
    ) -> anyhow::Result<()> {
        let mut plan = self
            .store
            .get_plan_by_session(&self.user_id, &msg.session_id)
            .await?;
        plan.human_clarification_response = Some(msg.human_clarification.clone());
        let plan = self.store.update_plan(plan).await?;

        self.store
            .add_agent_message(AgentMessage::new(
                &msg.session_id,
                &self.user_id,
                &plan.id,
                AgentName::Human.as_str(),
                &msg.human_clarification,
            ))
            .await?;
        self.store
            .add_agent_message(AgentMessage::new(
                &msg.session_id,
                &self.user_id,
                &plan.id,
                AgentName::Planner.as_str(),
                "Thanks. The plan has been updated.",
            ))
            .await?;
        Ok(())
    }

    async fn create_structured_plan(
        &self,
        task: &InputTask,
    ) -> anyhow::Result<(Plan, Vec<Step>)> {
        let agents_str = self
            .available_agents
            .iter()
            .map(|a| a.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let tools_str =
            serde_json::to_string(&self.tool_rows).unwrap_or_else(|_| "[]".to_string());
        let instruction =
            prompts::planner_instruction(&task.description, &agents_str, &tools_str);

        let request = CompletionRequest {
            messages: vec![
                Message::system(
                    "You are a Planner agent responsible for creating and managing plans. You \
                     analyze tasks, break them down into steps, and assign them to the \
                     appropriate specialized agents.",
                ),
                Message::user(instruction),
            ],
            response_format: Some(ResponseFormat {
                name: "PlannerResponsePlan".into(),
                schema: self.response_schema(),
            }),
            temperature: Some(0.0),
            ..CompletionRequest::default()
        };

        let content = match self.model.complete(request).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!(session_id = %task.session_id, "planner model call failed: {e}");
                return self.fallback_plan(task).await;
            }
        };

        let parsed = parse_planner_response(&content)
            .or_else(|| plan_from_text(&task.description, &content));

        match parsed {
            Some(response) if !response.steps.is_empty() => {
                self.persist_plan(task, response).await
            }
            _ => {
                warn!(
                    session_id = %task.session_id,
                    "no steps recoverable from planner output, using fallback plan"
                );
                self.fallback_plan(task).await
            }
        }
    }

    async fn persist_plan(
        &self,
        task: &InputTask,
        response: PlannerResponsePlan,
    ) -> anyhow::Result<(Plan, Vec<Step>)> {
        let mut plan = Plan::new(&task.session_id, &self.user_id, &response.initial_goal);
        plan.summary = Some(response.summary_plan_and_steps.clone());
        plan.human_clarification_request = response.human_clarification_request.clone();
        let plan = self.store.add_plan(plan).await?;

        let mut step_list = response.steps;
        if step_list.len() > self.max_plan_steps {
            warn!(
                plan_id = %plan.id,
                produced = step_list.len(),
                cap = self.max_plan_steps,
                "planner exceeded the step cap, truncating"
            );
            step_list.truncate(self.max_plan_steps);
        }

        let mut steps = Vec::with_capacity(step_list.len());
        for raw in step_list {
            let agent = match AgentName::parse_loose(&raw.agent) {
                Some(agent) if self.available_agents.contains(&agent) => agent,
                _ => {
                    warn!(agent = %raw.agent, "unknown agent name, defaulting to GenericAgent");
                    AgentName::Generic
                }
            };
            let step = self
                .store
                .add_step(Step::new(
                    &plan.id,
                    &task.session_id,
                    &self.user_id,
                    &raw.action,
                    agent,
                ))
                .await?;
            steps.push(step);
        }
        Ok((plan, steps))
    }

    /// The minimal two-step plan used when planning output is unrecoverable:
    /// analyze with the generic specialist, then ask the human for detail.
    async fn fallback_plan(&self, task: &InputTask) -> anyhow::Result<(Plan, Vec<Step>)> {
        let mut plan = Plan::new(&task.session_id, &self.user_id, &task.description);
        plan.summary = Some(format!("Plan created for: {}", task.description));
        let plan = self.store.add_plan(plan).await?;

        let analyze = self
            .store
            .add_step(Step::new(
                &plan.id,
                &task.session_id,
                &self.user_id,
                format!("Analyze the task: {}", task.description),
                AgentName::Generic,
            ))
            .await?;
        let clarify = self
            .store
            .add_step(Step::new(
                &plan.id,
                &task.session_id,
                &self.user_id,
                format!("Provide more details about: {}", task.description),
                AgentName::Human,
            ))
            .await?;
        Ok((plan, vec![analyze, clarify]))
    }

    fn response_schema(&self) -> serde_json::Value {
        let agent_names: Vec<&str> =
            self.available_agents.iter().map(|a| a.as_str()).collect();
        json!({
            "type": "object",
            "properties": {
                "initial_goal": { "type": "string" },
                "steps": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "action": { "type": "string" },
                            "agent": { "type": "string", "enum": agent_names }
                        },
                        "required": ["action", "agent"]
                    }
                },
                "summary_plan_and_steps": { "type": "string" },
                "human_clarification_request": { "type": ["string", "null"] }
            },
            "required": ["initial_goal", "steps", "summary_plan_and_steps"]
        })
    }
}

/// Rungs a–c of the parsing ladder: direct parse, fenced JSON, embedded
/// object extraction.
fn parse_planner_response(content: &str) -> Option<PlannerResponsePlan> {
    if let Ok(parsed) = serde_json::from_str::<PlannerResponsePlan>(content) {
        return Some(parsed);
    }

    let fenced = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").ok()?;
    if let Some(captures) = fenced.captures(content) {
        if let Ok(parsed) = serde_json::from_str::<PlannerResponsePlan>(&captures[1]) {
            return Some(parsed);
        }
    }

    let embedded = Regex::new(r#"(?s)\{.*"initial_goal".*"steps".*\}"#).ok()?;
    if let Some(found) = embedded.find(content) {
        if let Ok(parsed) = serde_json::from_str::<PlannerResponsePlan>(found.as_str()) {
            return Some(parsed);
        }
    }

    None
}

/// Rung d: reconstruct steps from numbered or bulleted free-form text.
/// Agents that cannot be recognised are assigned to the generic specialist
/// by the caller (the agent field is kept verbatim here).
fn plan_from_text(description: &str, text: &str) -> Option<PlannerResponsePlan> {
    let goal = Regex::new(r"(?:Goal|Initial Goal|Plan):\s*(.+)")
        .ok()
        .and_then(|re| re.captures(text).map(|c| c[1].trim().to_string()))
        .unwrap_or_else(|| description.to_string());

    let numbered = Regex::new(r"^\s*(?:Step\s*)?\d+[.:)]\s*(.+)$").ok()?;
    let bulleted = Regex::new(r"^\s*[•*-]\s*(.+)$").ok()?;

    let mut steps = Vec::new();
    for line in text.lines() {
        let rest = numbered
            .captures(line)
            .or_else(|| bulleted.captures(line))
            .map(|c| c[1].trim().to_string());
        let Some(rest) = rest else { continue };

        // "Agent: action" lines carry the assignee before the first colon;
        // anything else becomes a generic action.
        let (agent, action) = match rest.split_once(':') {
            Some((agent_text, action)) if AgentName::parse_loose(agent_text).is_some() => {
                (agent_text.trim().to_string(), action.trim().to_string())
            }
            _ => (String::new(), rest),
        };
        if !action.is_empty() {
            steps.push(PlannerResponseStep { action, agent });
        }
    }

    if steps.is_empty() {
        return None;
    }
    Some(PlannerResponsePlan {
        initial_goal: goal,
        summary_plan_and_steps: format!("Plan created from {description}"),
        steps,
        human_clarification_request: None,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
