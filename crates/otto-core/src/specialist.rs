// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use otto_model::{
    CompletionRequest, Message, ModelProvider, ToolChoice, ToolSchema as ModelToolSchema,
};
use otto_store::{AgentMessage, AgentName, Step, StepStatus, Store};
use otto_tools::{ToolCall, ToolRegistry};

use crate::{ActionRequest, ActionResponse};

/// A domain specialist: one tool slice, one system prompt, one execution
/// loop.  Executes a single assigned action on behalf of a plan step and
/// writes the terminal result to the store.
pub struct Specialist {
    name: AgentName,
    system_message: String,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn ModelProvider>,
    store: Arc<dyn Store>,
    user_id: String,
    /// Upper bound on model ↔ tool round trips per action.
    max_tool_rounds: u32,
}

impl Specialist {
    pub fn new(
        name: AgentName,
        system_message: impl Into<String>,
        tools: Arc<ToolRegistry>,
        model: Arc<dyn ModelProvider>,
        store: Arc<dyn Store>,
        user_id: impl Into<String>,
        max_tool_rounds: u32,
    ) -> Self {
        Self {
            name,
            system_message: system_message.into(),
            tools,
            model,
            store,
            user_id: user_id.into(),
            max_tool_rounds,
        }
    }

    pub fn name(&self) -> AgentName {
        self.name
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Execute one assigned action.
    ///
    /// On success exactly one terminal agent message and one terminal step
    /// update are written.  Failures take the same path with
    /// `status = failed` and the error text as the reply; errors never
    /// propagate to the caller beyond the returned response.
    pub async fn handle_action_request(&self, request: &ActionRequest) -> ActionResponse {
        let step = match self
            .store
            .get_step(&self.user_id, &request.session_id, &request.step_id)
            .await
        {
            Ok(step) => step,
            Err(e) => {
                warn!(step_id = %request.step_id, agent = %self.name, "step not found: {e}");
                return ActionResponse {
                    step_id: request.step_id.clone(),
                    plan_id: request.plan_id.clone(),
                    session_id: request.session_id.clone(),
                    result: "Step not found in memory.".into(),
                    status: StepStatus::Failed,
                };
            }
        };

        match self.run_tool_loop(request, &step).await {
            Ok(reply) => self.finish(request, step, reply, StepStatus::Completed).await,
            Err(e) => {
                warn!(
                    step_id = %request.step_id,
                    agent = %self.name,
                    "action execution failed: {e}"
                );
                self.finish(request, step, e.to_string(), StepStatus::Failed)
                    .await
            }
        }
    }

    /// The model ↔ tool loop: each round the model either emits tool calls
    /// (executed in declaration order, results appended as tool-role
    /// messages) or a terminal textual reply.
    async fn run_tool_loop(
        &self,
        request: &ActionRequest,
        step: &Step,
    ) -> anyhow::Result<String> {
        let mut history = vec![
            Message::system(&self.system_message),
            Message::assistant(&request.action),
            Message::user(format!(
                "{}. Now make the function call",
                step.human_feedback.as_deref().unwrap_or("No human feedback provided")
            )),
        ];
        let tool_schemas: Vec<ModelToolSchema> = self
            .tools
            .schemas()
            .into_iter()
            .map(|s| ModelToolSchema {
                name: s.name,
                description: s.description,
                parameters: s.parameters,
            })
            .collect();

        let mut rounds = 0u32;
        loop {
            rounds += 1;
            if rounds > self.max_tool_rounds {
                anyhow::bail!(
                    "tool invocation failed: exceeded {} tool rounds without a final reply",
                    self.max_tool_rounds
                );
            }

            let response = self
                .model
                .complete(CompletionRequest {
                    messages: history.clone(),
                    tools: tool_schemas.clone(),
                    tool_choice: ToolChoice::Auto,
                    ..CompletionRequest::default()
                })
                .await?;

            if !response.has_tool_calls() {
                return Ok(response.content);
            }

            for invocation in &response.tool_calls {
                history.push(Message::tool_call(
                    &invocation.id,
                    &invocation.name,
                    &invocation.arguments,
                ));
                let args: Value = serde_json::from_str(&invocation.arguments)
                    .unwrap_or_else(|_| Value::Object(Default::default()));
                let output = self
                    .tools
                    .execute(&ToolCall {
                        id: invocation.id.clone(),
                        name: invocation.name.clone(),
                        args,
                    })
                    .await;
                if output.is_error {
                    warn!(
                        agent = %self.name,
                        tool = %invocation.name,
                        "tool returned error: {}",
                        output.content
                    );
                }
                history.push(Message::tool_result(&invocation.id, &output.content));
            }
        }
    }

    /// Persist the terminal agent message and step update, then build the
    /// response for the Group Chat Manager.
    async fn finish(
        &self,
        request: &ActionRequest,
        mut step: Step,
        reply: String,
        status: StepStatus,
    ) -> ActionResponse {
        let message = AgentMessage::new(
            &request.session_id,
            &self.user_id,
            &request.plan_id,
            self.name.as_str(),
            &reply,
        )
        .with_step(&request.step_id);
        if let Err(e) = self.store.add_agent_message(message).await {
            warn!(step_id = %request.step_id, "failed to record agent message: {e}");
        }

        step.status = status;
        step.agent_reply = Some(reply.clone());
        if let Err(e) = self.store.update_step(step).await {
            warn!(step_id = %request.step_id, "failed to update step: {e}");
        } else {
            info!(
                step_id = %request.step_id,
                agent = %self.name,
                status = ?status,
                "step execution recorded"
            );
        }

        ActionResponse {
            step_id: request.step_id.clone(),
            plan_id: request.plan_id.clone(),
            session_id: request.session_id.clone(),
            result: reply,
            status,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use otto_model::{CompletionResponse, ScriptedMockProvider};
    use otto_store::{MemoryStore, Plan};
    use otto_tools::{load_catalogs, AgentCatalog};

    async fn seed_step(store: &MemoryStore, agent: AgentName) -> (Plan, Step) {
        let plan = store
            .add_plan(Plan::new("sess-1", "user-1", "goal"))
            .await
            .unwrap();
        let mut step = Step::new(&plan.id, "sess-1", "user-1", "Do the thing", agent);
        step.status = StepStatus::ActionRequested;
        step.human_feedback = Some("Looks good".into());
        let step = store.add_step(step).await.unwrap();
        (plan, step)
    }

    fn hr_catalog() -> AgentCatalog {
        load_catalogs(None).unwrap().remove(&AgentName::Hr).unwrap()
    }

    fn specialist(
        store: Arc<MemoryStore>,
        model: Arc<ScriptedMockProvider>,
    ) -> Specialist {
        let catalog = hr_catalog();
        Specialist::new(
            AgentName::Hr,
            &catalog.system_message,
            Arc::new(catalog.registry()),
            model,
            store,
            "user-1",
            8,
        )
    }

    #[tokio::test]
    async fn direct_text_reply_completes_step() {
        let store = Arc::new(MemoryStore::new());
        let (plan, step) = seed_step(&store, AgentName::Hr).await;
        let model = Arc::new(ScriptedMockProvider::always_text("All done."));
        let agent = specialist(store.clone(), model);

        let response = agent
            .handle_action_request(&ActionRequest {
                step_id: step.id.clone(),
                plan_id: plan.id.clone(),
                session_id: "sess-1".into(),
                action: "Do the thing".into(),
                agent: AgentName::Hr,
            })
            .await;

        assert_eq!(response.status, StepStatus::Completed);
        assert_eq!(response.result, "All done.");

        let stored = store.get_step("user-1", "sess-1", &step.id).await.unwrap();
        assert_eq!(stored.status, StepStatus::Completed);
        assert_eq!(stored.agent_reply.as_deref(), Some("All done."));

        let messages = store.list_messages_by_session("user-1", "sess-1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].source, "HrAgent");
        assert_eq!(messages[0].step_id.as_deref(), Some(step.id.as_str()));
    }

    #[tokio::test]
    async fn tool_call_round_feeds_result_back() {
        let store = Arc::new(MemoryStore::new());
        let (plan, step) = seed_step(&store, AgentName::Hr).await;
        let model = Arc::new(ScriptedMockProvider::tool_then_text(
            "call-1",
            "assign_mentor",
            r#"{"employee_name": "Jessica Smith"}"#,
            "Mentor assigned, see details above.",
        ));
        let agent = specialist(store.clone(), Arc::clone(&model));

        let response = agent
            .handle_action_request(&ActionRequest {
                step_id: step.id.clone(),
                plan_id: plan.id.clone(),
                session_id: "sess-1".into(),
                action: "Assign a mentor for Jessica Smith. Function: assign_mentor".into(),
                agent: AgentName::Hr,
            })
            .await;

        assert_eq!(response.status, StepStatus::Completed);
        // The second model call must have seen the tool result.
        let last = model.last_request().unwrap();
        let texts: Vec<String> = last
            .messages
            .iter()
            .map(|m| format!("{:?}", m.content))
            .collect();
        assert!(
            texts.iter().any(|t| t.contains("Mentor Assigned")),
            "tool result missing from history: {texts:?}"
        );
    }

    #[tokio::test]
    async fn human_feedback_is_visible_to_the_model() {
        let store = Arc::new(MemoryStore::new());
        let (plan, step) = seed_step(&store, AgentName::Hr).await;
        let model = Arc::new(ScriptedMockProvider::always_text("ok"));
        let agent = specialist(store.clone(), Arc::clone(&model));

        agent
            .handle_action_request(&ActionRequest {
                step_id: step.id.clone(),
                plan_id: plan.id.clone(),
                session_id: "sess-1".into(),
                action: "Do the thing".into(),
                agent: AgentName::Hr,
            })
            .await;

        let request = model.last_request().unwrap();
        let feedback_turn = request
            .messages
            .iter()
            .filter_map(|m| m.as_text())
            .find(|t| t.contains("Looks good"));
        assert!(feedback_turn.is_some(), "human feedback not in prompt");
    }

    #[tokio::test]
    async fn missing_step_fails_without_store_writes() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedMockProvider::always_text("unused"));
        let agent = specialist(store.clone(), model);

        let response = agent
            .handle_action_request(&ActionRequest {
                step_id: "nope".into(),
                plan_id: "p".into(),
                session_id: "sess-1".into(),
                action: "x".into(),
                agent: AgentName::Hr,
            })
            .await;

        assert_eq!(response.status, StepStatus::Failed);
        let messages = store.list_messages_by_session("user-1", "sess-1").await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn model_error_marks_step_failed() {
        let store = Arc::new(MemoryStore::new());
        let (plan, step) = seed_step(&store, AgentName::Hr).await;
        let model = Arc::new(ScriptedMockProvider::with_results(vec![Err(
            otto_model::ModelError::Transport("connection reset".into()),
        )]));
        let agent = specialist(store.clone(), model);

        let response = agent
            .handle_action_request(&ActionRequest {
                step_id: step.id.clone(),
                plan_id: plan.id.clone(),
                session_id: "sess-1".into(),
                action: "Do the thing".into(),
                agent: AgentName::Hr,
            })
            .await;

        assert_eq!(response.status, StepStatus::Failed);
        let stored = store.get_step("user-1", "sess-1", &step.id).await.unwrap();
        assert_eq!(stored.status, StepStatus::Failed);
        assert!(stored.agent_reply.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn loop_exhaustion_fails_the_step() {
        let store = Arc::new(MemoryStore::new());
        let (plan, step) = seed_step(&store, AgentName::Hr).await;
        // Every turn is another tool call; the loop must give up.
        let scripts: Vec<CompletionResponse> = (0..10)
            .map(|i| {
                CompletionResponse::tool_call(
                    format!("call-{i}"),
                    "assign_mentor",
                    r#"{"employee_name": "J"}"#,
                )
            })
            .collect();
        let model = Arc::new(ScriptedMockProvider::new(scripts));
        let catalog = hr_catalog();
        let agent = Specialist::new(
            AgentName::Hr,
            &catalog.system_message,
            Arc::new(catalog.registry()),
            model,
            store.clone(),
            "user-1",
            3,
        );

        let response = agent
            .handle_action_request(&ActionRequest {
                step_id: step.id.clone(),
                plan_id: plan.id.clone(),
                session_id: "sess-1".into(),
                action: "Do the thing".into(),
                agent: AgentName::Hr,
            })
            .await;

        assert_eq!(response.status, StepStatus::Failed);
        assert!(response.result.contains("tool rounds"));
    }
}
