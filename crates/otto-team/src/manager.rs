// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use otto_core::{prompts, ActionRequest, HumanFeedback, InputTask, Planner, Roster};
use otto_store::{
    AgentMessage, AgentName, HumanApprovalStatus, Plan, PlanStatus, Step, StepStatus, Store,
};

/// Deterministic session coordinator.
///
/// Single writer for step status transitions other than the terminal
/// `completed`/`agent_reply` write (owned by the assigned specialist) and
/// the feedback fields (owned by the Human agent).
pub struct GroupChatManager {
    store: Arc<dyn Store>,
    roster: Arc<Roster>,
    planner: Arc<Planner>,
    session_id: String,
    user_id: String,
    /// Session-wide cancellation; flips to `true` exactly once.
    cancel: watch::Receiver<bool>,
}

impl GroupChatManager {
    pub fn new(
        store: Arc<dyn Store>,
        roster: Arc<Roster>,
        planner: Arc<Planner>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            roster,
            planner,
            session_id: session_id.into(),
            user_id: user_id.into(),
            cancel,
        }
    }

    /// Record the user's objective and forward it to the planner.
    pub async fn handle_input_task(&self, task: &InputTask) -> anyhow::Result<Plan> {
        self.store
            .add_agent_message(AgentMessage::new(
                &task.session_id,
                &self.user_id,
                "",
                AgentName::Human.as_str(),
                &task.description,
            ))
            .await?;
        self.planner.handle_input_task(task).await
    }

    /// Apply human approval feedback to one step (when `step_id` is given)
    /// or to every open step of the plan in creation order.
    pub async fn handle_human_approval(&self, feedback: &HumanFeedback) -> anyhow::Result<()> {
        let steps = self
            .store
            .list_steps_by_plan(&self.user_id, &feedback.plan_id)
            .await?;
        let effective_feedback = self.compose_effective_feedback(feedback).await;

        match &feedback.step_id {
            Some(step_id) => {
                let Some(step) = steps.into_iter().find(|s| &s.id == step_id) else {
                    anyhow::bail!("step {step_id} not found in plan {}", feedback.plan_id);
                };
                self.apply_feedback(step, feedback.approved, &effective_feedback)
                    .await?;
            }
            None => {
                for step in steps {
                    if step.status.is_terminal() {
                        continue;
                    }
                    self.apply_feedback(step, feedback.approved, &effective_feedback)
                        .await?;
                }
            }
        }

        self.finalize_plan_if_terminal(&feedback.plan_id).await
    }

    /// The feedback string a specialist sees: step feedback, the date, and
    /// the plan-level clarification (or an explicit note that none exists).
    async fn compose_effective_feedback(&self, feedback: &HumanFeedback) -> String {
        let step_feedback = feedback.human_feedback.clone().unwrap_or_default();
        let general_information = format!("Today's date is {}.", Utc::now().date_naive());

        let plan_feedback = match self
            .store
            .get_plan(&self.user_id, &feedback.plan_id)
            .await
            .ok()
            .and_then(|p| p.human_clarification_response)
        {
            Some(clarification) => format!(
                "{clarification} This information may or may not be relevant to the step you \
                 are executing - it was feedback provided by the human user on the overall \
                 plan, which includes multiple steps, not just the one you are actioning now."
            ),
            None => "No human feedback provided on the overall plan.".to_string(),
        };

        format!("{step_feedback} {general_information} {plan_feedback}")
    }

    /// Transition one step on approval or rejection.  Terminal steps are
    /// left untouched so replayed feedback is a no-op.
    async fn apply_feedback(
        &self,
        mut step: Step,
        approved: bool,
        effective_feedback: &str,
    ) -> anyhow::Result<()> {
        if step.status.is_terminal() {
            info!(step_id = %step.id, status = ?step.status, "step already terminal, skipping");
            return Ok(());
        }

        step.human_feedback = Some(effective_feedback.to_string());
        if approved {
            step.status = StepStatus::Approved;
            step.human_approval_status = HumanApprovalStatus::Accepted;
            let step = self.store.update_step(step).await?;
            self.execute_step(step).await?;
        } else {
            step.status = StepStatus::Rejected;
            step.human_approval_status = HumanApprovalStatus::Rejected;
            let step = self.store.update_step(step).await?;
            info!(step_id = %step.id, agent = %step.agent, "step rejected");
        }
        Ok(())
    }

    /// Dispatch an approved step to its specialist.
    ///
    /// Human steps complete immediately: their feedback has already arrived
    /// by the time they are approved.  For everyone else execution precedes
    /// completion — only the specialist writes the terminal state.
    pub async fn execute_step(&self, mut step: Step) -> anyhow::Result<()> {
        if step.status != StepStatus::Approved {
            warn!(step_id = %step.id, status = ?step.status, "execute_step requires an approved step");
            return Ok(());
        }

        step.status = StepStatus::ActionRequested;
        let step = self.store.update_step(step).await?;

        if step.agent == AgentName::Human {
            let mut human_step = step;
            human_step.status = StepStatus::Completed;
            self.store.update_step(human_step).await?;
            info!("marking the step as complete - human feedback already received");
            return Ok(());
        }

        let preface = self.conversation_history_preface(&step).await?;
        let action_with_history = format!(
            "{preface}. Here is the step to action: {}. {}",
            step.action,
            prompts::STEP_SCOPE_SUFFIX
        );

        self.store
            .add_agent_message(
                AgentMessage::new(
                    &self.session_id,
                    &self.user_id,
                    &step.plan_id,
                    AgentName::GroupChatManager.as_str(),
                    format!(
                        "Requesting {} to perform action: {}",
                        step.agent.display_name(),
                        step.action
                    ),
                )
                .with_step(&step.id),
            )
            .await?;

        // Unknown agents fall back to the generic specialist.
        let specialist = self
            .roster
            .get(step.agent)
            .or_else(|| self.roster.get(AgentName::Generic));
        let Some(specialist) = specialist else {
            anyhow::bail!("no specialist available for agent {}", step.agent);
        };

        let request = ActionRequest {
            step_id: step.id.clone(),
            plan_id: step.plan_id.clone(),
            session_id: self.session_id.clone(),
            action: action_with_history,
            agent: step.agent,
        };
        info!(step_id = %step.id, agent = %step.agent, "dispatching action request");

        let mut cancel = self.cancel.clone();
        if *cancel.borrow() {
            // Session cancelled: leave the step in action_requested for an
            // operator to re-drive or fail.
            warn!(step_id = %step.id, "session cancelled before dispatch");
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.changed() => {
                warn!(step_id = %step.id, "session cancelled mid-dispatch");
            }
            response = specialist.handle_action_request(&request) => {
                info!(
                    step_id = %response.step_id,
                    status = ?response.status,
                    "action response received"
                );
            }
        }
        Ok(())
    }

    /// A plaintext block enumerating every prior step and its reply — the
    /// only cross-step context a specialist receives.
    async fn conversation_history_preface(&self, current: &Step) -> anyhow::Result<String> {
        let plan = self.store.get_plan(&self.user_id, &current.plan_id).await?;
        let steps = self
            .store
            .list_steps_by_plan(&self.user_id, &current.plan_id)
            .await?;

        let mut formatted = String::new();
        formatted.push_str(
            "<conversation_history>Here is the conversation history so far for the current \
             plan. This information may or may not be relevant to the step you have been asked \
             to execute.",
        );
        formatted.push_str(&format!(
            "The user's task was:\n{}\n\n",
            plan.summary.as_deref().unwrap_or(&plan.initial_goal)
        ));
        formatted.push_str("The conversation between the previous agents so far is below:\n");
        for (i, step) in steps.iter().enumerate() {
            if step.id == current.id {
                break;
            }
            formatted.push_str(&format!("Step {i}\n"));
            formatted.push_str(&format!("Group chat manager: {}\n", step.action));
            formatted.push_str(&format!(
                "{}: {}\n",
                step.agent,
                step.agent_reply.as_deref().unwrap_or("")
            ));
        }
        formatted.push_str("<conversation_history \\>");
        Ok(formatted)
    }

    /// When every step is terminal the plan transitions to completed and no
    /// further dispatches occur.
    async fn finalize_plan_if_terminal(&self, plan_id: &str) -> anyhow::Result<()> {
        let steps = self.store.list_steps_by_plan(&self.user_id, plan_id).await?;
        if steps.is_empty() {
            return Ok(());
        }
        let done = steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Completed | StepStatus::Failed))
            .count();
        if done == steps.len() {
            let mut plan = self.store.get_plan(&self.user_id, plan_id).await?;
            if plan.overall_status == PlanStatus::InProgress {
                plan.overall_status = PlanStatus::Completed;
                self.store.update_plan(plan).await?;
                info!(plan_id, "plan completed");
            }
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
