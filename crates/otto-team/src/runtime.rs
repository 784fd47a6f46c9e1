// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use otto_config::OrchestratorConfig;
use otto_core::{HumanAgent, HumanClarification, HumanFeedback, InputTask, Planner, Roster};
use otto_model::ModelProvider;
use otto_store::{AgentName, Plan, Session, Store};
use otto_tools::{flatten_catalogs, AgentCatalog};

use crate::GroupChatManager;

/// Per-session instance graph: one planner, one group chat manager, one
/// human agent, one specialist per catalog, a shared store handle, and a
/// cancellation scope.
///
/// All entry points serialise on a per-session lock, giving the
/// single-writer discipline the store invariants rely on.  Distinct
/// sessions proceed independently in parallel.
pub struct SessionRuntime {
    session_id: String,
    user_id: String,
    store: Arc<dyn Store>,
    planner: Arc<Planner>,
    manager: GroupChatManager,
    human: HumanAgent,
    lock: Mutex<()>,
    cancel_tx: watch::Sender<bool>,
}

impl SessionRuntime {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        store: Arc<dyn Store>,
        model: Arc<dyn ModelProvider>,
        catalogs: &BTreeMap<AgentName, AgentCatalog>,
        orchestrator: &OrchestratorConfig,
    ) -> Arc<Self> {
        let session_id = session_id.into();
        let user_id = user_id.into();

        let roster = Arc::new(Roster::build(
            catalogs,
            Arc::clone(&model),
            Arc::clone(&store),
            &user_id,
            orchestrator.max_tool_rounds,
        ));
        let planner = Arc::new(Planner::new(
            model,
            Arc::clone(&store),
            &user_id,
            roster.available_agents(),
            flatten_catalogs(catalogs),
            orchestrator.max_plan_steps,
        ));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let manager = GroupChatManager::new(
            Arc::clone(&store),
            roster,
            Arc::clone(&planner),
            &session_id,
            &user_id,
            cancel_rx,
        );
        let human = HumanAgent::new(Arc::clone(&store), &user_id);

        Arc::new(Self {
            session_id,
            user_id,
            store,
            planner,
            manager,
            human,
            lock: Mutex::new(()),
            cancel_tx,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Accept the user objective: ensure the session document exists, then
    /// route through the Group Chat Manager to the planner.
    pub async fn handle_input_task(&self, description: &str) -> anyhow::Result<Plan> {
        let _guard = self.lock.lock().await;

        if self
            .store
            .get_session(&self.user_id, &self.session_id)
            .await
            .is_err()
        {
            self.store
                .add_session(Session::new(&self.session_id, &self.user_id))
                .await?;
        }

        self.manager
            .handle_input_task(&InputTask {
                session_id: self.session_id.clone(),
                user_id: self.user_id.clone(),
                description: description.to_string(),
            })
            .await
    }

    /// Record step feedback through the Human agent.  This is the
    /// initiating mutation the HTTP layer waits for before answering.
    pub async fn record_step_feedback(&self, feedback: &HumanFeedback) {
        let _guard = self.lock.lock().await;
        self.human.handle_step_feedback(feedback).await;
    }

    /// Advance the plan through the Group Chat Manager: approve/reject the
    /// targeted steps and dispatch approved ones to their specialists.
    pub async fn advance_plan(&self, feedback: &HumanFeedback) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        self.manager.handle_human_approval(feedback).await
    }

    /// Record step feedback, then advance the plan.
    pub async fn handle_human_feedback(&self, feedback: &HumanFeedback) -> anyhow::Result<()> {
        self.record_step_feedback(feedback).await;
        self.advance_plan(feedback).await
    }

    /// Approve one step or every open step.  Routes through the Human agent
    /// first, matching the step-feedback path.
    pub async fn handle_approval(&self, feedback: &HumanFeedback) -> anyhow::Result<()> {
        self.handle_human_feedback(feedback).await
    }

    /// Record the user's clarification on the active plan.
    pub async fn handle_plan_clarification(
        &self,
        msg: &HumanClarification,
    ) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        self.planner.handle_plan_clarification(msg).await
    }

    /// Cancel in-flight work for this session.  Partially executed steps
    /// stay in `action_requested`; operators may re-drive or fail them.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
        info!(session_id = %self.session_id, "session cancelled");
    }
}

/// The only process-wide mutable state: the map of live session runtimes.
/// Lookup is lazy; everything a runtime holds is recoverable from the store,
/// so eviction is always safe.
pub struct SessionMap {
    store: Arc<dyn Store>,
    model: Arc<dyn ModelProvider>,
    catalogs: Arc<BTreeMap<AgentName, AgentCatalog>>,
    orchestrator: OrchestratorConfig,
    sessions: Mutex<HashMap<(String, String), Arc<SessionRuntime>>>,
}

impl SessionMap {
    pub fn new(
        store: Arc<dyn Store>,
        model: Arc<dyn ModelProvider>,
        catalogs: Arc<BTreeMap<AgentName, AgentCatalog>>,
        orchestrator: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            model,
            catalogs,
            orchestrator,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalogs(&self) -> &BTreeMap<AgentName, AgentCatalog> {
        &self.catalogs
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn get_or_create(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Arc<SessionRuntime> {
        let key = (user_id.to_string(), session_id.to_string());
        let mut sessions = self.sessions.lock().await;
        if let Some(runtime) = sessions.get(&key) {
            return Arc::clone(runtime);
        }
        debug!(user_id, session_id, "creating session runtime");
        let runtime = SessionRuntime::new(
            session_id,
            user_id,
            Arc::clone(&self.store),
            Arc::clone(&self.model),
            &self.catalogs,
            &self.orchestrator,
        );
        sessions.insert(key, Arc::clone(&runtime));
        runtime
    }

    /// Drop a session runtime (e.g. on inactivity).  State lives in the
    /// store, so the next lookup rebuilds an equivalent runtime.
    pub async fn evict(&self, user_id: &str, session_id: &str) {
        let key = (user_id.to_string(), session_id.to_string());
        if let Some(runtime) = self.sessions.lock().await.remove(&key) {
            runtime.cancel();
        }
    }

    /// Cancel and drop every live runtime.
    pub async fn clear(&self) {
        let mut sessions = self.sessions.lock().await;
        for runtime in sessions.values() {
            runtime.cancel();
        }
        sessions.clear();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
