// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::future::join_all;
use tracing::{info, warn};

use otto_core::{HumanClarification, HumanFeedback};
use otto_store::{DataType, PlanWithSteps, StoreError};
use otto_team::SessionMap;
use otto_tools::flatten_catalogs;

use crate::{
    dto::{
        FeedbackResponse, InputTaskRequest, InputTaskResponse, PlansQuery, RefusedResponse,
        StatusResponse,
    },
    error::NodeError,
    rai::RaiGate,
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionMap>,
    pub rai: Arc<RaiGate>,
    /// Header carrying the authenticated user principal id.
    pub principal_header: String,
}

/// Extract the authenticated user principal; absent or empty → 400.
fn principal(state: &AppState, headers: &HeaderMap) -> Result<String, NodeError> {
    headers
        .get(&state.principal_header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(NodeError::Unauthenticated)
}

/// Orchestrator failures surface with their store classification when they
/// have one (conflict on duplicate active plans, not-found on stale ids).
fn orchestrator_error(e: anyhow::Error) -> NodeError {
    match e.downcast::<StoreError>() {
        Ok(store_error) => store_error.into(),
        Err(other) => NodeError::Internal(other),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/input_task", post(input_task))
        .route("/human_feedback", post(human_feedback))
        .route("/human_clarification_on_plan", post(human_clarification))
        .route("/approve_step_or_steps", post(approve_step_or_steps))
        .route("/plans", get(get_plans))
        .route("/steps/:plan_id", get(get_steps))
        .route("/agent_messages/:session_id", get(get_agent_messages))
        .route(
            "/messages",
            get(get_all_messages).delete(delete_all_messages),
        )
        .route("/api/agent-tools", get(get_agent_tools))
        .with_state(state)
}

/// Receive the initial input task from the user.  The responsible-AI gate
/// runs before anything else; a refused task answers 200 with
/// `"Plan not created"` and no state change.
async fn input_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<InputTaskRequest>,
) -> Result<Response, NodeError> {
    if !state.rai.check(&body.description).await {
        info!("RAI gate refused task");
        return Ok(Json(RefusedResponse::plan_not_created()).into_response());
    }

    let user_id = principal(&state, &headers)?;
    let session_id = body
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let runtime = state.sessions.get_or_create(&user_id, &session_id).await;
    let plan = runtime
        .handle_input_task(&body.description)
        .await
        .map_err(orchestrator_error)?;

    Ok(Json(InputTaskResponse {
        status: format!("Plan created with ID: {}", plan.id),
        session_id,
        plan_id: plan.id,
        description: body.description,
    })
    .into_response())
}

/// Receive human feedback on a step.  Feedback is persisted before the
/// response; plan advancement continues asynchronously.
async fn human_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<HumanFeedback>,
) -> Result<Json<FeedbackResponse>, NodeError> {
    let user_id = principal(&state, &headers)?;
    // Unknown step ids are a validation failure with no state change.
    if let Some(step_id) = &body.step_id {
        state
            .sessions
            .store()
            .get_step(&user_id, &body.session_id, step_id)
            .await?;
    }
    let runtime = state
        .sessions
        .get_or_create(&user_id, &body.session_id)
        .await;
    runtime.record_step_feedback(&body).await;

    let advance = Arc::clone(&runtime);
    let feedback = body.clone();
    tokio::spawn(async move {
        if let Err(e) = advance.advance_plan(&feedback).await {
            warn!(session_id = %feedback.session_id, "plan advancement failed: {e}");
        }
    });

    Ok(Json(FeedbackResponse {
        status: "Feedback received".into(),
        session_id: body.session_id,
        step_id: body.step_id,
    }))
}

/// Receive human clarification on a plan.
async fn human_clarification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<HumanClarification>,
) -> Result<Json<FeedbackResponse>, NodeError> {
    let user_id = principal(&state, &headers)?;
    let runtime = state
        .sessions
        .get_or_create(&user_id, &body.session_id)
        .await;
    runtime
        .handle_plan_clarification(&body)
        .await
        .map_err(orchestrator_error)?;

    Ok(Json(FeedbackResponse {
        status: "Clarification received".into(),
        session_id: body.session_id,
        step_id: None,
    }))
}

/// Approve one step or, without `step_id`, every open step of the plan.
async fn approve_step_or_steps(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<HumanFeedback>,
) -> Result<Json<StatusResponse>, NodeError> {
    let user_id = principal(&state, &headers)?;
    if let Some(step_id) = &body.step_id {
        state
            .sessions
            .store()
            .get_step(&user_id, &body.session_id, step_id)
            .await?;
    }
    let runtime = state
        .sessions
        .get_or_create(&user_id, &body.session_id)
        .await;
    runtime.record_step_feedback(&body).await;

    let advance = Arc::clone(&runtime);
    let feedback = body.clone();
    tokio::spawn(async move {
        if let Err(e) = advance.advance_plan(&feedback).await {
            warn!(session_id = %feedback.session_id, "plan advancement failed: {e}");
        }
    });

    let status = match &body.step_id {
        Some(step_id) => format!("Step {step_id} - Approval:{}.", body.approved),
        None => "All steps approved".to_string(),
    };
    Ok(Json(StatusResponse { status }))
}

/// Plans for the user: one `PlanWithSteps` for the given session, or the
/// newest five across sessions.
async fn get_plans(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PlansQuery>,
) -> Result<Json<Vec<PlanWithSteps>>, NodeError> {
    let user_id = principal(&state, &headers)?;
    let store = state.sessions.store();

    if let Some(session_id) = &query.session_id {
        let plan = store.get_plan_by_session(&user_id, session_id).await?;
        let steps = store.list_steps_by_plan(&user_id, &plan.id).await?;
        return Ok(Json(vec![PlanWithSteps::assemble(plan, steps)]));
    }

    let plans = store.list_plans(&user_id, 5).await?;
    let assembled = join_all(plans.into_iter().map(|plan| {
        let user_id = user_id.clone();
        async move {
            let steps = store.list_steps_by_plan(&user_id, &plan.id).await?;
            Ok::<_, StoreError>(PlanWithSteps::assemble(plan, steps))
        }
    }))
    .await
    .into_iter()
    .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(assembled))
}

async fn get_steps(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
) -> Result<Json<Vec<otto_store::Step>>, NodeError> {
    let user_id = principal(&state, &headers)?;
    let steps = state
        .sessions
        .store()
        .list_steps_by_plan(&user_id, &plan_id)
        .await?;
    Ok(Json(steps))
}

async fn get_agent_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<otto_store::AgentMessage>>, NodeError> {
    let user_id = principal(&state, &headers)?;
    let messages = state
        .sessions
        .store()
        .list_messages_by_session(&user_id, &session_id)
        .await?;
    Ok(Json(messages))
}

/// All documents for the user, newest first, capped at 100.
async fn get_all_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<serde_json::Value>>, NodeError> {
    let user_id = principal(&state, &headers)?;
    let items = state.sessions.store().list_all_items(&user_id, 100).await?;
    Ok(Json(items))
}

/// Delete all plans, sessions, steps, and agent messages for the user, and
/// drop every live session runtime.
async fn delete_all_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, NodeError> {
    let user_id = principal(&state, &headers)?;
    let store = state.sessions.store();
    for data_type in [
        DataType::Plan,
        DataType::Session,
        DataType::Step,
        DataType::AgentMessage,
    ] {
        let deleted = store.delete_all_of_type(&user_id, data_type).await?;
        info!(user_id = %user_id, data_type = %data_type, deleted, "deleted documents");
    }
    state.sessions.clear().await;
    Ok(Json(StatusResponse {
        status: "All messages deleted".into(),
    }))
}

/// The flattened tool catalog.  Served without authentication: the catalog
/// is static data shared by every user.
async fn get_agent_tools(
    State(state): State<AppState>,
) -> Json<Vec<otto_tools::ToolCatalogRow>> {
    Json(flatten_catalogs(state.sessions.catalogs()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use otto_config::OrchestratorConfig;
    use otto_model::{CompletionResponse, ScriptedMockProvider};
    use otto_store::MemoryStore;
    use otto_tools::load_catalogs;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(scripts: Vec<CompletionResponse>, rai_allows: bool) -> Router {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedMockProvider::new(scripts));
        let sessions = Arc::new(SessionMap::new(
            store,
            model,
            Arc::new(load_catalogs(None).unwrap()),
            OrchestratorConfig::default(),
        ));
        let rai_model = Arc::new(ScriptedMockProvider::always_text(if rai_allows {
            "FALSE"
        } else {
            "TRUE"
        }));
        let state = AppState {
            sessions,
            rai: Arc::new(RaiGate::new(rai_model, true)),
            principal_header: "x-ms-client-principal-id".into(),
        };
        router(state)
    }

    fn plan_script() -> CompletionResponse {
        CompletionResponse::text(
            json!({
                "initial_goal": "Onboard Jessica Smith",
                "steps": [{
                    "action": "Schedule an orientation session for Jessica Smith. Function: schedule_orientation_session",
                    "agent": "HrAgent"
                }],
                "summary_plan_and_steps": "Onboard Jessica via HR.",
                "human_clarification_request": null
            })
            .to_string(),
        )
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header("x-ms-client-principal-id", user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn missing_principal_is_rejected() {
        let app = app(vec![], true);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/plans")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["detail"], json!("no user"));
    }

    #[tokio::test]
    async fn input_task_creates_plan() {
        let app = app(vec![plan_script()], true);
        let response = app
            .oneshot(post_json(
                "/input_task",
                Some("user-1"),
                json!({"session_id": "sess-1", "description": "Onboard a new employee, Jessica Smith."}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["session_id"], json!("sess-1"));
        assert!(body["status"].as_str().unwrap().starts_with("Plan created with ID:"));
        assert!(!body["plan_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rai_refusal_answers_plan_not_created() {
        let app = app(vec![plan_script()], false);
        let response = app
            .oneshot(post_json(
                "/input_task",
                Some("user-1"),
                json!({"description": "some task"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body, json!({"status": "Plan not created"}));
    }

    #[tokio::test]
    async fn plans_by_session_carry_step_counters() {
        let app = app(vec![plan_script()], true);
        app.clone()
            .oneshot(post_json(
                "/input_task",
                Some("user-1"),
                json!({"session_id": "sess-1", "description": "Onboard Jessica"}),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/plans?session_id=sess-1")
                    .header("x-ms-client-principal-id", "user-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let plans = body.as_array().unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0]["total_steps"], json!(1));
        assert_eq!(plans[0]["planned"], json!(1));
        assert_eq!(plans[0]["overall_status"], json!("in_progress"));
    }

    #[tokio::test]
    async fn plans_for_unknown_session_is_404() {
        let app = app(vec![], true);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/plans?session_id=missing")
                    .header("x-ms-client-principal-id", "user-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn agent_tools_catalog_is_public() {
        let app = app(vec![], true);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/agent-tools")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let rows = body.as_array().unwrap();
        assert!(rows
            .iter()
            .any(|r| r["function"] == json!("grant_database_access")));
        assert!(rows.iter().all(|r| r.get("agent").is_some()
            && r.get("description").is_some()
            && r.get("arguments").is_some()));
    }

    #[tokio::test]
    async fn delete_messages_wipes_user_documents() {
        let app = app(vec![plan_script()], true);
        app.clone()
            .oneshot(post_json(
                "/input_task",
                Some("user-1"),
                json!({"session_id": "sess-1", "description": "Onboard Jessica"}),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/messages")
                    .header("x-ms-client-principal-id", "user-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/messages")
                    .header("x-ms-client-principal-id", "user-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 0);
    }
}
