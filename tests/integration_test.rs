// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// End-to-end orchestration scenarios driven through the session runtime
/// with scripted mock models and the in-memory store.
use std::sync::Arc;

use serde_json::json;

use otto_config::OrchestratorConfig;
use otto_core::HumanFeedback;
use otto_model::{CompletionResponse, ScriptedMockProvider};
use otto_store::{AgentName, MemoryStore, PlanStatus, StepStatus};
use otto_team::SessionMap;
use otto_tools::load_catalogs;

fn session_map(scripts: Vec<CompletionResponse>) -> SessionMap {
    SessionMap::new(
        Arc::new(MemoryStore::new()),
        Arc::new(ScriptedMockProvider::new(scripts)),
        Arc::new(load_catalogs(None).unwrap()),
        OrchestratorConfig::default(),
    )
}

fn onboarding_plan() -> CompletionResponse {
    CompletionResponse::text(
        json!({
            "initial_goal": "Onboard a new employee, Jessica Smith.",
            "steps": [
                {"action": "Schedule an orientation session to onboard Jessica Smith. Function: schedule_orientation_session", "agent": "HrAgent"},
                {"action": "Register Jessica Smith for benefits. Function: register_for_benefits", "agent": "HrAgent"},
                {"action": "Set up an Office 365 account for Jessica Smith. Function: set_up_office_365_account", "agent": "TechSupportAgent"}
            ],
            "summary_plan_and_steps": "Onboard Jessica Smith through HR and tech support.",
            "human_clarification_request": "What is Jessica's email address and start date?"
        })
        .to_string(),
    )
}

fn approval(plan_id: &str, step_id: &str, approved: bool) -> HumanFeedback {
    HumanFeedback {
        step_id: Some(step_id.to_string()),
        plan_id: plan_id.to_string(),
        session_id: "sess-1".into(),
        approved,
        human_feedback: None,
        updated_action: None,
    }
}

/// Onboarding objectives produce HR-assigned steps and no marketing steps.
#[tokio::test]
async fn onboarding_task_lands_on_hr() {
    let map = session_map(vec![onboarding_plan()]);
    let runtime = map.get_or_create("user-1", "sess-1").await;
    let plan = runtime
        .handle_input_task("Onboard a new employee, Jessica Smith.")
        .await
        .unwrap();

    let steps = map
        .store()
        .list_steps_by_plan("user-1", &plan.id)
        .await
        .unwrap();
    assert!(steps.iter().any(|s| s.agent == AgentName::Hr));
    assert!(steps.iter().all(|s| s.agent != AgentName::Marketing));
    for step in steps.iter().filter(|s| s.action.to_lowercase().contains("onboard")) {
        assert_eq!(step.agent, AgentName::Hr);
    }
}

/// A task one function call can solve becomes a single tech-support step
/// naming the tool.
#[tokio::test]
async fn trivial_tool_task_is_a_single_step() {
    let map = session_map(vec![CompletionResponse::text(
        json!({
            "initial_goal": "Grant database access to alice@corp for SalesDB",
            "steps": [{
                "action": "Grant database access to alice@corp for SalesDB. Function: grant_database_access",
                "agent": "TechSupportAgent"
            }],
            "summary_plan_and_steps": "Grant alice@corp access to SalesDB.",
            "human_clarification_request": null
        })
        .to_string(),
    )]);
    let runtime = map.get_or_create("user-1", "sess-1").await;
    let plan = runtime
        .handle_input_task("Grant database access to alice@corp for SalesDB")
        .await
        .unwrap();

    let steps = map
        .store()
        .list_steps_by_plan("user-1", &plan.id)
        .await
        .unwrap();
    assert_eq!(steps.len(), 1);
    assert!(steps[0].action.contains("grant_database_access"));
    assert_eq!(steps[0].agent, AgentName::TechSupport);
}

/// Press-release objectives target marketing and its press-release tool.
#[tokio::test]
async fn press_release_task_targets_marketing() {
    let map = session_map(vec![CompletionResponse::text(
        json!({
            "initial_goal": "Draft a press release for our new Roaming Extras Pack.",
            "steps": [{
                "action": "Draft a press release for the Roaming Extras Pack. Function: generate_press_release",
                "agent": "MarketingAgent"
            }],
            "summary_plan_and_steps": "Draft the press release via marketing.",
            "human_clarification_request": null
        })
        .to_string(),
    )]);
    let runtime = map.get_or_create("user-1", "sess-1").await;
    let plan = runtime
        .handle_input_task("Draft a press release for our new Roaming Extras Pack.")
        .await
        .unwrap();

    let steps = map
        .store()
        .list_steps_by_plan("user-1", &plan.id)
        .await
        .unwrap();
    assert!(steps
        .iter()
        .any(|s| s.agent == AgentName::Marketing && s.action.contains("generate_press_release")));
}

/// The clarification loop stores the exact response on the plan and appends
/// the human/planner message pair.
#[tokio::test]
async fn clarification_updates_plan_and_appends_messages() {
    let map = session_map(vec![onboarding_plan()]);
    let runtime = map.get_or_create("user-1", "sess-1").await;
    let plan = runtime
        .handle_input_task("Onboard a new employee, Jessica Smith.")
        .await
        .unwrap();

    let clarification = "Her email is jessica@contoso.com, start date 2025-06-01.";
    runtime
        .handle_plan_clarification(&otto_core::HumanClarification {
            plan_id: plan.id.clone(),
            session_id: "sess-1".into(),
            human_clarification: clarification.into(),
        })
        .await
        .unwrap();

    let stored = map.store().get_plan("user-1", &plan.id).await.unwrap();
    assert_eq!(stored.human_clarification_response.as_deref(), Some(clarification));

    let messages = map
        .store()
        .list_messages_by_session("user-1", "sess-1")
        .await
        .unwrap();
    let human = messages
        .iter()
        .find(|m| m.source == "HumanAgent" && m.content.contains(clarification));
    assert!(human.is_some(), "clarification message missing");
    let planner_ack = messages
        .iter()
        .find(|m| m.source == "PlannerAgent" && m.content.contains("updated"));
    assert!(planner_ack.is_some(), "planner acknowledgement missing");
}

/// Approving one step executes exactly that step; the others stay planned.
#[tokio::test]
async fn approval_executes_exactly_one_step() {
    let map = session_map(vec![
        onboarding_plan(),
        CompletionResponse::text("Orientation scheduled for Jessica."),
    ]);
    let runtime = map.get_or_create("user-1", "sess-1").await;
    let plan = runtime
        .handle_input_task("Onboard a new employee, Jessica Smith.")
        .await
        .unwrap();
    let steps = map
        .store()
        .list_steps_by_plan("user-1", &plan.id)
        .await
        .unwrap();
    assert_eq!(steps.len(), 3);

    runtime
        .handle_human_feedback(&approval(&plan.id, &steps[0].id, true))
        .await
        .unwrap();

    let first = map
        .store()
        .get_step("user-1", "sess-1", &steps[0].id)
        .await
        .unwrap();
    assert_eq!(first.status, StepStatus::Completed);
    assert_eq!(
        first.agent_reply.as_deref(),
        Some("Orientation scheduled for Jessica.")
    );

    for other in &steps[1..] {
        let stored = map
            .store()
            .get_step("user-1", "sess-1", &other.id)
            .await
            .unwrap();
        assert_eq!(stored.status, StepStatus::Planned, "step {} moved", other.id);
    }

    // Exactly one terminal specialist message for the executed step.
    let messages = map
        .store()
        .list_messages_by_session("user-1", "sess-1")
        .await
        .unwrap();
    let specialist_messages: Vec<_> = messages
        .iter()
        .filter(|m| m.source == "HrAgent" && m.step_id.as_deref() == Some(steps[0].id.as_str()))
        .collect();
    assert_eq!(specialist_messages.len(), 1);
}

/// Rejection terminates the step without dispatch or specialist messages.
#[tokio::test]
async fn rejection_halts_the_step() {
    let map = session_map(vec![onboarding_plan()]);
    let runtime = map.get_or_create("user-1", "sess-1").await;
    let plan = runtime
        .handle_input_task("Onboard a new employee, Jessica Smith.")
        .await
        .unwrap();
    let steps = map
        .store()
        .list_steps_by_plan("user-1", &plan.id)
        .await
        .unwrap();

    runtime
        .handle_human_feedback(&approval(&plan.id, &steps[0].id, false))
        .await
        .unwrap();

    let stored = map
        .store()
        .get_step("user-1", "sess-1", &steps[0].id)
        .await
        .unwrap();
    assert_eq!(stored.status, StepStatus::Rejected);
    assert_eq!(
        stored.human_approval_status,
        otto_store::HumanApprovalStatus::Rejected
    );
    assert!(stored.agent_reply.is_none());

    let messages = map
        .store()
        .list_messages_by_session("user-1", "sess-1")
        .await
        .unwrap();
    assert!(messages.iter().all(|m| m.source != "HrAgent"));
}

/// Driving every step to a terminal state completes the plan.
#[tokio::test]
async fn plan_completes_when_every_step_is_terminal() {
    let map = session_map(vec![
        onboarding_plan(),
        CompletionResponse::text("Orientation scheduled."),
        CompletionResponse::text("Benefits registered."),
        CompletionResponse::text("Office 365 account created."),
    ]);
    let runtime = map.get_or_create("user-1", "sess-1").await;
    let plan = runtime
        .handle_input_task("Onboard a new employee, Jessica Smith.")
        .await
        .unwrap();

    runtime
        .handle_human_feedback(&HumanFeedback {
            step_id: None,
            plan_id: plan.id.clone(),
            session_id: "sess-1".into(),
            approved: true,
            human_feedback: Some("All approved".into()),
            updated_action: None,
        })
        .await
        .unwrap();

    let steps = map
        .store()
        .list_steps_by_plan("user-1", &plan.id)
        .await
        .unwrap();
    assert!(steps.iter().all(|s| s.status == StepStatus::Completed));

    let stored = map.store().get_plan("user-1", &plan.id).await.unwrap();
    assert_eq!(stored.overall_status, PlanStatus::Completed);
}

/// A second objective in the same session conflicts while the first plan is
/// still in progress.
#[tokio::test]
async fn second_active_plan_in_session_is_rejected() {
    let map = session_map(vec![onboarding_plan(), onboarding_plan()]);
    let runtime = map.get_or_create("user-1", "sess-1").await;
    runtime
        .handle_input_task("Onboard a new employee, Jessica Smith.")
        .await
        .unwrap();
    let second = runtime.handle_input_task("Onboard another employee.").await;
    assert!(second.is_err());
}

/// Messages within a session observe insertion order end-to-end.
#[tokio::test]
async fn agent_messages_are_ordered() {
    let map = session_map(vec![
        onboarding_plan(),
        CompletionResponse::text("Orientation scheduled."),
    ]);
    let runtime = map.get_or_create("user-1", "sess-1").await;
    let plan = runtime
        .handle_input_task("Onboard a new employee, Jessica Smith.")
        .await
        .unwrap();
    let steps = map
        .store()
        .list_steps_by_plan("user-1", &plan.id)
        .await
        .unwrap();
    runtime
        .handle_human_feedback(&approval(&plan.id, &steps[0].id, true))
        .await
        .unwrap();

    let messages = map
        .store()
        .list_messages_by_session("user-1", "sess-1")
        .await
        .unwrap();
    // User task first, then plan announcements, then dispatch, then reply.
    assert!(messages.len() >= 4);
    assert_eq!(messages[0].source, "HumanAgent");
    let mut prev = messages[0].ts;
    for m in &messages[1..] {
        assert!(m.ts > prev, "message timestamps must strictly increase");
        prev = m.ts;
    }
    let dispatch_idx = messages
        .iter()
        .position(|m| m.source == "GroupChatManager")
        .unwrap();
    let reply_idx = messages.iter().position(|m| m.source == "HrAgent").unwrap();
    assert!(dispatch_idx < reply_idx);
}
