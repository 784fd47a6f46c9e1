// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    AgentMessage, DataType, Plan, PlanStatus, Session, Step, Store, StoreError,
};

/// Strictly-increasing server clock.  Two documents stamped back-to-back in
/// the same microsecond still get distinct, ordered timestamps.
pub(crate) struct TsClock {
    last_micros: Mutex<i64>,
}

impl TsClock {
    pub(crate) fn new() -> Self {
        Self {
            last_micros: Mutex::new(0),
        }
    }

    pub(crate) fn next(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let mut last = self.last_micros.lock().unwrap();
        let stamped = now.max(*last + 1);
        *last = stamped;
        Utc.timestamp_micros(stamped).single().unwrap_or_else(Utc::now)
    }
}

/// In-memory store: the default backend for local runs and tests.
///
/// All locks are released before any await point, so the store is safe to
/// share across concurrent sessions.
pub struct MemoryStore {
    clock: TsClock,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: Vec<Session>,
    plans: Vec<Plan>,
    steps: Vec<Step>,
    messages: Vec<AgentMessage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            clock: TsClock::new(),
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add_session(&self, mut session: Session) -> Result<Session, StoreError> {
        session.ts = self.clock.next();
        let mut inner = self.inner.lock().unwrap();
        match inner
            .sessions
            .iter_mut()
            .find(|s| s.id == session.id && s.user_id == session.user_id)
        {
            Some(existing) => {
                // Upsert keeps the original timestamp.
                session.ts = existing.ts;
                *existing = session.clone();
            }
            None => inner.sessions.push(session.clone()),
        }
        Ok(session)
    }

    async fn get_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .sessions
            .iter()
            .find(|s| s.user_id == user_id && s.id == session_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("session {session_id}")))
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn add_plan(&self, mut plan: Plan) -> Result<Plan, StoreError> {
        plan.ts = self.clock.next();
        let mut inner = self.inner.lock().unwrap();
        let active_exists = inner.plans.iter().any(|p| {
            p.user_id == plan.user_id
                && p.session_id == plan.session_id
                && p.overall_status == PlanStatus::InProgress
        });
        if active_exists && plan.overall_status == PlanStatus::InProgress {
            return Err(StoreError::Conflict(format!(
                "session {} already has an active plan",
                plan.session_id
            )));
        }
        inner.plans.push(plan.clone());
        Ok(plan)
    }

    async fn update_plan(&self, mut plan: Plan) -> Result<Plan, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .plans
            .iter_mut()
            .find(|p| p.id == plan.id && p.user_id == plan.user_id)
        {
            Some(existing) => {
                plan.ts = existing.ts;
                *existing = plan.clone();
                Ok(plan)
            }
            None => Err(StoreError::not_found(format!("plan {}", plan.id))),
        }
    }

    async fn get_plan(&self, user_id: &str, plan_id: &str) -> Result<Plan, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .plans
            .iter()
            .find(|p| p.user_id == user_id && p.id == plan_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("plan {plan_id}")))
    }

    async fn get_plan_by_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Plan, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .plans
            .iter()
            .filter(|p| p.user_id == user_id && p.session_id == session_id)
            .max_by_key(|p| p.ts)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("plan for session {session_id}")))
    }

    async fn list_plans(&self, user_id: &str, limit: usize) -> Result<Vec<Plan>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut plans: Vec<Plan> = inner
            .plans
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        plans.sort_by(|a, b| b.ts.cmp(&a.ts));
        plans.truncate(limit);
        Ok(plans)
    }

    async fn add_step(&self, mut step: Step) -> Result<Step, StoreError> {
        step.ts = self.clock.next();
        let mut inner = self.inner.lock().unwrap();
        inner.steps.push(step.clone());
        Ok(step)
    }

    async fn update_step(&self, mut step: Step) -> Result<Step, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .steps
            .iter_mut()
            .find(|s| s.id == step.id && s.user_id == step.user_id)
        {
            Some(existing) => {
                step.ts = existing.ts;
                *existing = step.clone();
                Ok(step)
            }
            None => Err(StoreError::not_found(format!("step {}", step.id))),
        }
    }

    async fn get_step(
        &self,
        user_id: &str,
        session_id: &str,
        step_id: &str,
    ) -> Result<Step, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .steps
            .iter()
            .find(|s| s.user_id == user_id && s.session_id == session_id && s.id == step_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("step {step_id}")))
    }

    async fn list_steps_by_plan(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Vec<Step>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut steps: Vec<Step> = inner
            .steps
            .iter()
            .filter(|s| s.user_id == user_id && s.plan_id == plan_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.ts);
        Ok(steps)
    }

    async fn add_agent_message(
        &self,
        mut message: AgentMessage,
    ) -> Result<AgentMessage, StoreError> {
        message.ts = self.clock.next();
        let mut inner = self.inner.lock().unwrap();
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages_by_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<AgentMessage>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut messages: Vec<AgentMessage> = inner
            .messages
            .iter()
            .filter(|m| m.user_id == user_id && m.session_id == session_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.ts);
        Ok(messages)
    }

    async fn list_messages_by_plan(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Vec<AgentMessage>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut messages: Vec<AgentMessage> = inner
            .messages
            .iter()
            .filter(|m| m.user_id == user_id && m.plan_id == plan_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.ts);
        Ok(messages)
    }

    async fn delete_all_of_type(
        &self,
        user_id: &str,
        data_type: DataType,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let deleted;
        match data_type {
            DataType::Session => {
                let before = inner.sessions.len();
                inner.sessions.retain(|s| s.user_id != user_id);
                deleted = before - inner.sessions.len();
            }
            DataType::Plan => {
                let before = inner.plans.len();
                inner.plans.retain(|p| p.user_id != user_id);
                deleted = before - inner.plans.len();
            }
            DataType::Step => {
                let before = inner.steps.len();
                inner.steps.retain(|s| s.user_id != user_id);
                deleted = before - inner.steps.len();
            }
            DataType::AgentMessage => {
                let before = inner.messages.len();
                inner.messages.retain(|m| m.user_id != user_id);
                deleted = before - inner.messages.len();
            }
        }
        Ok(deleted as u64)
    }

    async fn list_all_items(
        &self,
        user_id: &str,
        cap: usize,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut items: Vec<(DateTime<Utc>, serde_json::Value)> = Vec::new();
        for s in inner.sessions.iter().filter(|s| s.user_id == user_id) {
            items.push((s.ts, tagged(s, DataType::Session)?));
        }
        for p in inner.plans.iter().filter(|p| p.user_id == user_id) {
            items.push((p.ts, tagged(p, DataType::Plan)?));
        }
        for s in inner.steps.iter().filter(|s| s.user_id == user_id) {
            items.push((s.ts, tagged(s, DataType::Step)?));
        }
        for m in inner.messages.iter().filter(|m| m.user_id == user_id) {
            items.push((m.ts, tagged(m, DataType::AgentMessage)?));
        }
        items.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(items.into_iter().take(cap).map(|(_, v)| v).collect())
    }

    async fn query(
        &self,
        user_id: &str,
        data_type: DataType,
        predicate: &(dyn for<'r> Fn(&'r serde_json::Value) -> bool + Send + Sync),
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut items: Vec<(DateTime<Utc>, serde_json::Value)> = Vec::new();
        match data_type {
            DataType::Session => {
                for s in inner.sessions.iter().filter(|s| s.user_id == user_id) {
                    items.push((s.ts, tagged(s, data_type)?));
                }
            }
            DataType::Plan => {
                for p in inner.plans.iter().filter(|p| p.user_id == user_id) {
                    items.push((p.ts, tagged(p, data_type)?));
                }
            }
            DataType::Step => {
                for s in inner.steps.iter().filter(|s| s.user_id == user_id) {
                    items.push((s.ts, tagged(s, data_type)?));
                }
            }
            DataType::AgentMessage => {
                for m in inner.messages.iter().filter(|m| m.user_id == user_id) {
                    items.push((m.ts, tagged(m, data_type)?));
                }
            }
        }
        items.sort_by_key(|(ts, _)| *ts);
        Ok(items
            .into_iter()
            .map(|(_, v)| v)
            .filter(|v| predicate(v))
            .collect())
    }
}

/// Serialize an entity with its `data_type` discriminator attached.
fn tagged<T: serde::Serialize>(
    entity: &T,
    data_type: DataType,
) -> Result<serde_json::Value, StoreError> {
    let mut value = serde_json::to_value(entity)?;
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "data_type".into(),
            serde_json::Value::String(data_type.as_str().into()),
        );
    }
    Ok(value)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
