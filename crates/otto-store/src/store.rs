// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{
    AgentMessage, DataType, Plan, Session, Step, StoreError,
};

/// Typed operations over the partitioned document store.
///
/// Every operation is scoped to a `user_id`; documents are partitioned by
/// `session_id`.  `add_*` operations assign the server timestamp and return
/// the stored document.  Updates preserve the creation timestamp so that
/// insertion order (steps within a plan, messages within a session) is
/// always recoverable by ordering on `ts`.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Sessions ─────────────────────────────────────────────────────────────
    async fn add_session(&self, session: Session) -> Result<Session, StoreError>;
    async fn get_session(&self, user_id: &str, session_id: &str)
        -> Result<Session, StoreError>;
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, StoreError>;

    // ── Plans ────────────────────────────────────────────────────────────────
    /// Fails with [`StoreError::Conflict`] when the session already has an
    /// in-progress plan.
    async fn add_plan(&self, plan: Plan) -> Result<Plan, StoreError>;
    async fn update_plan(&self, plan: Plan) -> Result<Plan, StoreError>;
    async fn get_plan(&self, user_id: &str, plan_id: &str) -> Result<Plan, StoreError>;
    /// The most recent plan for a session.
    async fn get_plan_by_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Plan, StoreError>;
    /// Newest `limit` plans for the user, across sessions.
    async fn list_plans(&self, user_id: &str, limit: usize) -> Result<Vec<Plan>, StoreError>;

    // ── Steps ────────────────────────────────────────────────────────────────
    async fn add_step(&self, step: Step) -> Result<Step, StoreError>;
    async fn update_step(&self, step: Step) -> Result<Step, StoreError>;
    async fn get_step(
        &self,
        user_id: &str,
        session_id: &str,
        step_id: &str,
    ) -> Result<Step, StoreError>;
    /// Steps of a plan in creation order.
    async fn list_steps_by_plan(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Vec<Step>, StoreError>;

    // ── Agent messages ───────────────────────────────────────────────────────
    async fn add_agent_message(
        &self,
        message: AgentMessage,
    ) -> Result<AgentMessage, StoreError>;
    /// Messages of a session in insertion order.
    async fn list_messages_by_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<AgentMessage>, StoreError>;
    async fn list_messages_by_plan(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Vec<AgentMessage>, StoreError>;

    // ── Maintenance ──────────────────────────────────────────────────────────
    /// Delete every document of `data_type` owned by the user.  Returns the
    /// number of deleted documents.
    async fn delete_all_of_type(
        &self,
        user_id: &str,
        data_type: DataType,
    ) -> Result<u64, StoreError>;

    /// All documents owned by the user as raw JSON, newest first, capped.
    async fn list_all_items(
        &self,
        user_id: &str,
        cap: usize,
    ) -> Result<Vec<serde_json::Value>, StoreError>;

    /// Generic partitioned query: documents of one type, as raw JSON in
    /// creation order, filtered by `predicate`.
    async fn query(
        &self,
        user_id: &str,
        data_type: DataType,
        predicate: &(dyn for<'r> Fn(&'r serde_json::Value) -> bool + Send + Sync),
    ) -> Result<Vec<serde_json::Value>, StoreError>;
}
