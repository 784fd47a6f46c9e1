// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tracing::{info, warn};

use otto_store::{AgentMessage, AgentName, StepStatus, Store};

use crate::{ApprovalSignal, HumanFeedback};

/// The Human-in-the-Loop agent: records approval feedback on a step and
/// signals the Group Chat Manager to advance the plan.
pub struct HumanAgent {
    store: Arc<dyn Store>,
    user_id: String,
}

impl HumanAgent {
    pub fn new(store: Arc<dyn Store>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }

    /// Record feedback for one step.
    ///
    /// Steps assigned to the Human agent complete on feedback receipt; other
    /// steps only get the feedback recorded here and complete through their
    /// specialist.  Returns the signal the Group Chat Manager uses to
    /// advance the plan, or `None` when the step cannot be found (logged,
    /// not an error).
    pub async fn handle_step_feedback(
        &self,
        feedback: &HumanFeedback,
    ) -> Option<ApprovalSignal> {
        let step_id = feedback.step_id.as_deref()?;
        let mut step = match self
            .store
            .get_step(&self.user_id, &feedback.session_id, step_id)
            .await
        {
            Ok(step) => step,
            Err(_) => {
                info!(step_id, "no step found for feedback");
                return None;
            }
        };
        if step.status.is_terminal() {
            info!(step_id, status = ?step.status, "step already terminal, feedback ignored");
            return None;
        }

        step.human_feedback = feedback.human_feedback.clone();
        if let Some(updated) = &feedback.updated_action {
            step.updated_action = Some(updated.clone());
        }
        if step.agent == AgentName::Human {
            step.status = StepStatus::Completed;
        }
        let plan_id = step.plan_id.clone();
        let action = step.action.clone();
        if let Err(e) = self.store.update_step(step).await {
            warn!(step_id, "failed to record feedback: {e}");
            return None;
        }

        if let Err(e) = self
            .store
            .add_agent_message(
                AgentMessage::new(
                    &feedback.session_id,
                    &self.user_id,
                    &plan_id,
                    AgentName::Human.as_str(),
                    format!("Received feedback for step: {action}"),
                )
                .with_step(step_id),
            )
            .await
        {
            warn!(step_id, "failed to record feedback message: {e}");
        }

        Some(ApprovalSignal {
            session_id: feedback.session_id.clone(),
            plan_id,
            step_id: step_id.to_string(),
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use otto_store::{MemoryStore, Plan, Step};

    async fn seed(store: &MemoryStore, agent: AgentName) -> (Plan, Step) {
        let plan = store
            .add_plan(Plan::new("sess-1", "user-1", "goal"))
            .await
            .unwrap();
        let step = store
            .add_step(Step::new(&plan.id, "sess-1", "user-1", "Confirm the details", agent))
            .await
            .unwrap();
        (plan, step)
    }

    fn feedback(step_id: &str, plan_id: &str) -> HumanFeedback {
        HumanFeedback {
            step_id: Some(step_id.to_string()),
            plan_id: plan_id.to_string(),
            session_id: "sess-1".into(),
            approved: true,
            human_feedback: Some("Approved, go ahead".into()),
            updated_action: None,
        }
    }

    #[tokio::test]
    async fn human_step_completes_on_feedback() {
        let store = Arc::new(MemoryStore::new());
        let (plan, step) = seed(&store, AgentName::Human).await;
        let agent = HumanAgent::new(store.clone(), "user-1");

        let signal = agent
            .handle_step_feedback(&feedback(&step.id, &plan.id))
            .await
            .unwrap();
        assert_eq!(signal.step_id, step.id);

        let stored = store.get_step("user-1", "sess-1", &step.id).await.unwrap();
        assert_eq!(stored.status, StepStatus::Completed);
        assert_eq!(stored.human_feedback.as_deref(), Some("Approved, go ahead"));
    }

    #[tokio::test]
    async fn specialist_step_keeps_status_on_feedback() {
        let store = Arc::new(MemoryStore::new());
        let (plan, step) = seed(&store, AgentName::Hr).await;
        let agent = HumanAgent::new(store.clone(), "user-1");

        agent
            .handle_step_feedback(&feedback(&step.id, &plan.id))
            .await
            .unwrap();

        let stored = store.get_step("user-1", "sess-1", &step.id).await.unwrap();
        assert_eq!(stored.status, StepStatus::Planned);
        assert_eq!(stored.human_feedback.as_deref(), Some("Approved, go ahead"));
    }

    #[tokio::test]
    async fn feedback_writes_a_human_agent_message() {
        let store = Arc::new(MemoryStore::new());
        let (plan, step) = seed(&store, AgentName::Human).await;
        let agent = HumanAgent::new(store.clone(), "user-1");

        agent
            .handle_step_feedback(&feedback(&step.id, &plan.id))
            .await
            .unwrap();

        let messages = store
            .list_messages_by_session("user-1", "sess-1")
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].source, "HumanAgent");
        assert!(messages[0].content.contains("Received feedback for step"));
        assert_eq!(messages[0].step_id.as_deref(), Some(step.id.as_str()));
    }

    #[tokio::test]
    async fn missing_step_returns_none_silently() {
        let store = Arc::new(MemoryStore::new());
        let agent = HumanAgent::new(store.clone(), "user-1");
        let signal = agent
            .handle_step_feedback(&feedback("missing-step", "p1"))
            .await;
        assert!(signal.is_none());
        let messages = store
            .list_messages_by_session("user-1", "sess-1")
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn updated_action_is_recorded() {
        let store = Arc::new(MemoryStore::new());
        let (plan, step) = seed(&store, AgentName::Hr).await;
        let agent = HumanAgent::new(store.clone(), "user-1");

        let mut fb = feedback(&step.id, &plan.id);
        fb.updated_action = Some("Use the new orientation template".into());
        agent.handle_step_feedback(&fb).await.unwrap();

        let stored = store.get_step("user-1", "sess-1", &step.id).await.unwrap();
        assert_eq!(
            stored.updated_action.as_deref(),
            Some("Use the new orientation template")
        );
    }
}
