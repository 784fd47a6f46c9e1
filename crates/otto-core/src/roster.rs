// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;
use std::sync::Arc;

use otto_model::ModelProvider;
use otto_store::{AgentName, Store};
use otto_tools::AgentCatalog;

use crate::Specialist;

/// The set of specialists available to a session: a mapping from agent name
/// to a live specialist bound to its tool slice and system prompt.
pub struct Roster {
    specialists: BTreeMap<AgentName, Arc<Specialist>>,
}

impl Roster {
    /// Build one specialist per catalog entry, all sharing the same store
    /// and model handles.
    pub fn build(
        catalogs: &BTreeMap<AgentName, AgentCatalog>,
        model: Arc<dyn ModelProvider>,
        store: Arc<dyn Store>,
        user_id: &str,
        max_tool_rounds: u32,
    ) -> Self {
        let mut specialists = BTreeMap::new();
        for (agent, catalog) in catalogs {
            let specialist = Specialist::new(
                *agent,
                &catalog.system_message,
                Arc::new(catalog.registry()),
                Arc::clone(&model),
                Arc::clone(&store),
                user_id,
                max_tool_rounds,
            );
            specialists.insert(*agent, Arc::new(specialist));
        }
        Self { specialists }
    }

    pub fn get(&self, name: AgentName) -> Option<Arc<Specialist>> {
        self.specialists.get(&name).cloned()
    }

    /// Names the planner may assign steps to: every specialist in the
    /// roster plus the Human agent.
    pub fn available_agents(&self) -> Vec<AgentName> {
        let mut names: Vec<AgentName> = self.specialists.keys().copied().collect();
        if !names.contains(&AgentName::Human) {
            names.push(AgentName::Human);
        }
        names
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
