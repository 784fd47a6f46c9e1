// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! SQLite-backed store: one `documents` table, one row per entity, JSON
//! body column, `data_type` discriminator, `session_id` partition column.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::{
    memory::TsClock, AgentMessage, DataType, Plan, PlanStatus, Session, Step, Store, StoreError,
};

/// Retry budget for `SQLITE_BUSY`-class failures.
const MAX_BUSY_RETRIES: u32 = 3;
const BUSY_BACKOFF_MS: u64 = 50;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: TsClock,
    #[allow(dead_code)]
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run the schema migration.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let conn = Connection::open(&path).map_err(transport)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(transport)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id         TEXT NOT NULL,
                data_type  TEXT NOT NULL,
                session_id TEXT NOT NULL,
                user_id    TEXT NOT NULL,
                plan_id    TEXT,
                ts         INTEGER NOT NULL,
                body       TEXT NOT NULL,
                PRIMARY KEY (id, data_type)
            );
            CREATE INDEX IF NOT EXISTS idx_documents_partition
                ON documents (user_id, data_type, session_id);
            CREATE INDEX IF NOT EXISTS idx_documents_plan
                ON documents (user_id, data_type, plan_id);",
        )
        .map_err(transport)?;
        debug!(path = %path.display(), "sqlite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            clock: TsClock::new(),
            path,
        })
    }

    /// Run `op` against the connection, retrying busy/locked failures with a
    /// short backoff.  The lock is released before each sleep.
    async fn with_conn<T>(
        &self,
        op: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let mut attempt = 0u32;
        loop {
            let result = {
                let conn = self.conn.lock().unwrap();
                op(&conn)
            };
            match result {
                Ok(v) => return Ok(v),
                Err(e) if is_busy(&e) && attempt < MAX_BUSY_RETRIES => {
                    attempt += 1;
                    tokio::time::sleep(std::time::Duration::from_millis(
                        BUSY_BACKOFF_MS * u64::from(attempt),
                    ))
                    .await;
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    return Err(StoreError::not_found("document"))
                }
                Err(e) => return Err(transport(e)),
            }
        }
    }

    async fn upsert(
        &self,
        id: &str,
        data_type: DataType,
        session_id: &str,
        user_id: &str,
        plan_id: Option<&str>,
        ts_micros: i64,
        body: String,
    ) -> Result<(), StoreError> {
        let id = id.to_string();
        let session_id = session_id.to_string();
        let user_id = user_id.to_string();
        let plan_id = plan_id.map(str::to_string);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO documents (id, data_type, session_id, user_id, plan_id, ts, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (id, data_type) DO UPDATE SET body = excluded.body",
                params![
                    id,
                    data_type.as_str(),
                    session_id,
                    user_id,
                    plan_id,
                    ts_micros,
                    body
                ],
            )
            .map(|_| ())
        })
        .await
    }

    /// Creation timestamp of an existing document, if present.
    async fn stored_ts(&self, id: &str, data_type: DataType) -> Result<Option<i64>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT ts FROM documents WHERE id = ?1 AND data_type = ?2")?;
            let mut rows = stmt.query(params![id, data_type.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row.get(0)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn query_bodies(
        &self,
        sql: &'static str,
        binds: Vec<String>,
    ) -> Result<Vec<String>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(sql)?;
            let params: Vec<&dyn rusqlite::ToSql> =
                binds.iter().map(|b| b as &dyn rusqlite::ToSql).collect();
            let rows = stmt.query_map(params.as_slice(), |row| row.get::<_, String>(0))?;
            rows.collect()
        })
        .await
    }
}

fn transport(e: rusqlite::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
    )
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(body)?)
}

#[async_trait]
impl Store for SqliteStore {
    async fn add_session(&self, mut session: Session) -> Result<Session, StoreError> {
        match self.stored_ts(&session.id, DataType::Session).await? {
            Some(micros) => {
                session.ts = Utc
                    .timestamp_micros(micros)
                    .single()
                    .unwrap_or_else(Utc::now);
            }
            None => session.ts = self.clock.next(),
        }
        let body = serde_json::to_string(&session)?;
        self.upsert(
            &session.id,
            DataType::Session,
            &session.id,
            &session.user_id,
            None,
            session.ts.timestamp_micros(),
            body,
        )
        .await?;
        Ok(session)
    }

    async fn get_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Session, StoreError> {
        let bodies = self
            .query_bodies(
                "SELECT body FROM documents
                 WHERE user_id = ?1 AND data_type = 'session' AND id = ?2",
                vec![user_id.into(), session_id.into()],
            )
            .await?;
        match bodies.first() {
            Some(body) => decode(body),
            None => Err(StoreError::not_found(format!("session {session_id}"))),
        }
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let bodies = self
            .query_bodies(
                "SELECT body FROM documents
                 WHERE user_id = ?1 AND data_type = 'session' ORDER BY ts ASC",
                vec![user_id.into()],
            )
            .await?;
        bodies.iter().map(|b| decode(b)).collect()
    }

    async fn add_plan(&self, mut plan: Plan) -> Result<Plan, StoreError> {
        if plan.overall_status == PlanStatus::InProgress {
            let existing = self.get_plan_by_session(&plan.user_id, &plan.session_id).await;
            if let Ok(p) = existing {
                if p.overall_status == PlanStatus::InProgress {
                    return Err(StoreError::Conflict(format!(
                        "session {} already has an active plan",
                        plan.session_id
                    )));
                }
            }
        }
        plan.ts = self.clock.next();
        let body = serde_json::to_string(&plan)?;
        self.upsert(
            &plan.id,
            DataType::Plan,
            &plan.session_id,
            &plan.user_id,
            Some(&plan.id),
            plan.ts.timestamp_micros(),
            body,
        )
        .await?;
        Ok(plan)
    }

    async fn update_plan(&self, mut plan: Plan) -> Result<Plan, StoreError> {
        let micros = self
            .stored_ts(&plan.id, DataType::Plan)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("plan {}", plan.id)))?;
        plan.ts = Utc.timestamp_micros(micros).single().unwrap_or_else(Utc::now);
        let body = serde_json::to_string(&plan)?;
        self.upsert(
            &plan.id,
            DataType::Plan,
            &plan.session_id,
            &plan.user_id,
            Some(&plan.id),
            micros,
            body,
        )
        .await?;
        Ok(plan)
    }

    async fn get_plan(&self, user_id: &str, plan_id: &str) -> Result<Plan, StoreError> {
        let bodies = self
            .query_bodies(
                "SELECT body FROM documents
                 WHERE user_id = ?1 AND data_type = 'plan' AND id = ?2",
                vec![user_id.into(), plan_id.into()],
            )
            .await?;
        match bodies.first() {
            Some(body) => decode(body),
            None => Err(StoreError::not_found(format!("plan {plan_id}"))),
        }
    }

    async fn get_plan_by_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Plan, StoreError> {
        let bodies = self
            .query_bodies(
                "SELECT body FROM documents
                 WHERE user_id = ?1 AND data_type = 'plan' AND session_id = ?2
                 ORDER BY ts DESC LIMIT 1",
                vec![user_id.into(), session_id.into()],
            )
            .await?;
        match bodies.first() {
            Some(body) => decode(body),
            None => Err(StoreError::not_found(format!(
                "plan for session {session_id}"
            ))),
        }
    }

    async fn list_plans(&self, user_id: &str, limit: usize) -> Result<Vec<Plan>, StoreError> {
        let user_id = user_id.to_string();
        let bodies: Vec<String> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT body FROM documents
                     WHERE user_id = ?1 AND data_type = 'plan'
                     ORDER BY ts DESC LIMIT ?2",
                )?;
                let rows =
                    stmt.query_map(params![user_id, limit as i64], |row| row.get::<_, String>(0))?;
                rows.collect()
            })
            .await?;
        bodies.iter().map(|b| decode(b)).collect()
    }

    async fn add_step(&self, mut step: Step) -> Result<Step, StoreError> {
        step.ts = self.clock.next();
        let body = serde_json::to_string(&step)?;
        self.upsert(
            &step.id,
            DataType::Step,
            &step.session_id,
            &step.user_id,
            Some(&step.plan_id),
            step.ts.timestamp_micros(),
            body,
        )
        .await?;
        Ok(step)
    }

    async fn update_step(&self, mut step: Step) -> Result<Step, StoreError> {
        let micros = self
            .stored_ts(&step.id, DataType::Step)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("step {}", step.id)))?;
        step.ts = Utc.timestamp_micros(micros).single().unwrap_or_else(Utc::now);
        let body = serde_json::to_string(&step)?;
        self.upsert(
            &step.id,
            DataType::Step,
            &step.session_id,
            &step.user_id,
            Some(&step.plan_id),
            micros,
            body,
        )
        .await?;
        Ok(step)
    }

    async fn get_step(
        &self,
        user_id: &str,
        session_id: &str,
        step_id: &str,
    ) -> Result<Step, StoreError> {
        let bodies = self
            .query_bodies(
                "SELECT body FROM documents
                 WHERE user_id = ?1 AND data_type = 'step'
                   AND session_id = ?2 AND id = ?3",
                vec![user_id.into(), session_id.into(), step_id.into()],
            )
            .await?;
        match bodies.first() {
            Some(body) => decode(body),
            None => Err(StoreError::not_found(format!("step {step_id}"))),
        }
    }

    async fn list_steps_by_plan(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Vec<Step>, StoreError> {
        let bodies = self
            .query_bodies(
                "SELECT body FROM documents
                 WHERE user_id = ?1 AND data_type = 'step' AND plan_id = ?2
                 ORDER BY ts ASC",
                vec![user_id.into(), plan_id.into()],
            )
            .await?;
        bodies.iter().map(|b| decode(b)).collect()
    }

    async fn add_agent_message(
        &self,
        mut message: AgentMessage,
    ) -> Result<AgentMessage, StoreError> {
        message.ts = self.clock.next();
        let body = serde_json::to_string(&message)?;
        self.upsert(
            &message.id,
            DataType::AgentMessage,
            &message.session_id,
            &message.user_id,
            Some(&message.plan_id),
            message.ts.timestamp_micros(),
            body,
        )
        .await?;
        Ok(message)
    }

    async fn list_messages_by_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<AgentMessage>, StoreError> {
        let bodies = self
            .query_bodies(
                "SELECT body FROM documents
                 WHERE user_id = ?1 AND data_type = 'agent_message' AND session_id = ?2
                 ORDER BY ts ASC",
                vec![user_id.into(), session_id.into()],
            )
            .await?;
        bodies.iter().map(|b| decode(b)).collect()
    }

    async fn list_messages_by_plan(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> Result<Vec<AgentMessage>, StoreError> {
        let bodies = self
            .query_bodies(
                "SELECT body FROM documents
                 WHERE user_id = ?1 AND data_type = 'agent_message' AND plan_id = ?2
                 ORDER BY ts ASC",
                vec![user_id.into(), plan_id.into()],
            )
            .await?;
        bodies.iter().map(|b| decode(b)).collect()
    }

    async fn delete_all_of_type(
        &self,
        user_id: &str,
        data_type: DataType,
    ) -> Result<u64, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM documents WHERE user_id = ?1 AND data_type = ?2",
                params![user_id, data_type.as_str()],
            )
            .map(|n| n as u64)
        })
        .await
    }

    async fn list_all_items(
        &self,
        user_id: &str,
        cap: usize,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let user_id = user_id.to_string();
        let rows: Vec<(String, String)> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT body, data_type FROM documents
                     WHERE user_id = ?1 ORDER BY ts DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![user_id, cap as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                rows.collect()
            })
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for (body, data_type) in rows {
            let mut value: serde_json::Value = serde_json::from_str(&body)?;
            if let Some(object) = value.as_object_mut() {
                object.insert("data_type".into(), serde_json::Value::String(data_type));
            }
            items.push(value);
        }
        Ok(items)
    }

    async fn query(
        &self,
        user_id: &str,
        data_type: DataType,
        predicate: &(dyn for<'r> Fn(&'r serde_json::Value) -> bool + Send + Sync),
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let user_id_owned = user_id.to_string();
        let bodies: Vec<String> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT body FROM documents
                     WHERE user_id = ?1 AND data_type = ?2 ORDER BY ts ASC",
                )?;
                let rows = stmt.query_map(params![user_id_owned, data_type.as_str()], |row| {
                    row.get::<_, String>(0)
                })?;
                rows.collect()
            })
            .await?;

        let mut items = Vec::new();
        for body in bodies {
            let mut value: serde_json::Value = serde_json::from_str(&body)?;
            if let Some(object) = value.as_object_mut() {
                object.insert(
                    "data_type".into(),
                    serde_json::Value::String(data_type.as_str().into()),
                );
            }
            if predicate(&value) {
                items.push(value);
            }
        }
        Ok(items)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
