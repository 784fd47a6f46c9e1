// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document discriminator stored alongside every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Session,
    Plan,
    Step,
    AgentMessage,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Plan => "plan",
            Self::Step => "step",
            Self::AgentMessage => "agent_message",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "session" => Some(Self::Session),
            "plan" => Some(Self::Plan),
            "step" => Some(Self::Step),
            "agent_message" => Some(Self::AgentMessage),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named agents known to the orchestrator.
///
/// The planner's response schema is constrained to exactly this enumeration;
/// unknown agent strings fall back to [`AgentName::Generic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentName {
    #[serde(rename = "HrAgent")]
    Hr,
    #[serde(rename = "MarketingAgent")]
    Marketing,
    #[serde(rename = "ProcurementAgent")]
    Procurement,
    #[serde(rename = "ProductAgent")]
    Product,
    #[serde(rename = "TechSupportAgent")]
    TechSupport,
    #[serde(rename = "GenericAgent")]
    Generic,
    #[serde(rename = "HumanAgent")]
    Human,
    #[serde(rename = "PlannerAgent")]
    Planner,
    #[serde(rename = "GroupChatManager")]
    GroupChatManager,
}

impl AgentName {
    /// Wire name used in documents and LLM prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hr => "HrAgent",
            Self::Marketing => "MarketingAgent",
            Self::Procurement => "ProcurementAgent",
            Self::Product => "ProductAgent",
            Self::TechSupport => "TechSupportAgent",
            Self::Generic => "GenericAgent",
            Self::Human => "HumanAgent",
            Self::Planner => "PlannerAgent",
            Self::GroupChatManager => "GroupChatManager",
        }
    }

    /// Human-facing name with camel-case words spaced ("Tech Support Agent").
    pub fn display_name(&self) -> String {
        let mut out = String::new();
        for (i, c) in self.as_str().chars().enumerate() {
            if c.is_uppercase() && i > 0 {
                out.push(' ');
            }
            out.push(c);
        }
        out
    }

    /// The specialists a planner may assign steps to (Human included;
    /// coordinator-only agents excluded).
    pub fn roster() -> &'static [AgentName] {
        &[
            Self::Hr,
            Self::Marketing,
            Self::Procurement,
            Self::Product,
            Self::TechSupport,
            Self::Generic,
            Self::Human,
        ]
    }

    /// Lenient parse accepting the wire name plus common variants seen in
    /// model output: `"HR"`, `"Hr_Agent"`, `"tech support"`, etc.
    pub fn parse_loose(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let key = key.strip_suffix("agent").unwrap_or(&key);
        match key {
            "hr" => Some(Self::Hr),
            "marketing" => Some(Self::Marketing),
            "procurement" => Some(Self::Procurement),
            "product" => Some(Self::Product),
            "techsupport" => Some(Self::TechSupport),
            "generic" => Some(Self::Generic),
            "human" => Some(Self::Human),
            "planner" => Some(Self::Planner),
            "groupchatmanager" => Some(Self::GroupChatManager),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Planned,
    AwaitingFeedback,
    Approved,
    Rejected,
    ActionRequested,
    Completed,
    Failed,
}

impl StepStatus {
    /// Terminal steps are immutable: completed, failed, rejected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanApprovalStatus {
    Requested,
    Accepted,
    Rejected,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A single user objective run.  Sessions have no terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub current_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_to_user: Option<String>,
    #[serde(default)]
    pub ts: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            current_status: "in_progress".into(),
            message_to_user: None,
            ts: Utc::now(),
        }
    }
}

/// The planner's decomposition of an objective.  At most one plan per
/// session is `in_progress` at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub initial_goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub overall_status: PlanStatus,
    /// Producing component; always the planner.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_clarification_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_clarification_response: Option<String>,
    #[serde(default)]
    pub ts: DateTime<Utc>,
}

impl Plan {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        initial_goal: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            initial_goal: initial_goal.into(),
            summary: None,
            overall_status: PlanStatus::InProgress,
            source: AgentName::Planner.as_str().into(),
            human_clarification_request: None,
            human_clarification_response: None,
            ts: Utc::now(),
        }
    }
}

/// An ordered unit of work within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub plan_id: String,
    pub session_id: String,
    pub user_id: String,
    /// The instruction the specialist must execute, naming the target tool.
    pub action: String,
    pub agent: AgentName,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_reply: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<String>,
    pub human_approval_status: HumanApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_action: Option<String>,
    #[serde(default)]
    pub ts: DateTime<Utc>,
}

impl Step {
    pub fn new(
        plan_id: impl Into<String>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        action: impl Into<String>,
        agent: AgentName,
    ) -> Self {
        Self {
            id: new_id(),
            plan_id: plan_id.into(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            action: action.into(),
            agent,
            status: StepStatus::Planned,
            agent_reply: None,
            human_feedback: None,
            human_approval_status: HumanApprovalStatus::Requested,
            updated_action: None,
            ts: Utc::now(),
        }
    }
}

/// Conversational record; append-only within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Name of the producing component.
    pub source: String,
    pub content: String,
    #[serde(default)]
    pub ts: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        plan_id: impl Into<String>,
        source: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            plan_id: plan_id.into(),
            step_id: None,
            source: source.into(),
            content: content.into(),
            ts: Utc::now(),
        }
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }
}

/// A plan with its steps and aggregate per-status counters, as served by
/// the plans endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanWithSteps {
    #[serde(flatten)]
    pub plan: Plan,
    pub steps: Vec<Step>,
    pub total_steps: usize,
    pub planned: usize,
    pub awaiting_feedback: usize,
    pub approved: usize,
    pub rejected: usize,
    pub action_requested: usize,
    pub completed: usize,
    pub failed: usize,
}

impl PlanWithSteps {
    /// Attach steps to a plan and compute the counters.  The overall status
    /// flips to `completed` when every step is terminal via completion or
    /// failure (rejected steps keep a plan open for re-planning).
    pub fn assemble(plan: Plan, steps: Vec<Step>) -> Self {
        let mut out = Self {
            plan,
            steps,
            total_steps: 0,
            planned: 0,
            awaiting_feedback: 0,
            approved: 0,
            rejected: 0,
            action_requested: 0,
            completed: 0,
            failed: 0,
        };
        out.update_step_counts();
        out
    }

    pub fn update_step_counts(&mut self) {
        self.total_steps = self.steps.len();
        self.planned = self.count(StepStatus::Planned);
        self.awaiting_feedback = self.count(StepStatus::AwaitingFeedback);
        self.approved = self.count(StepStatus::Approved);
        self.rejected = self.count(StepStatus::Rejected);
        self.action_requested = self.count(StepStatus::ActionRequested);
        self.completed = self.count(StepStatus::Completed);
        self.failed = self.count(StepStatus::Failed);

        if self.total_steps > 0 && self.completed + self.failed == self.total_steps {
            self.plan.overall_status = PlanStatus::Completed;
        }
    }

    fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_name_wire_round_trip() {
        let json = serde_json::to_string(&AgentName::TechSupport).unwrap();
        assert_eq!(json, "\"TechSupportAgent\"");
        let back: AgentName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AgentName::TechSupport);
    }

    #[test]
    fn agent_name_parse_loose_variants() {
        assert_eq!(AgentName::parse_loose("HR"), Some(AgentName::Hr));
        assert_eq!(AgentName::parse_loose("Hr_Agent"), Some(AgentName::Hr));
        assert_eq!(AgentName::parse_loose("HrAgent"), Some(AgentName::Hr));
        assert_eq!(
            AgentName::parse_loose("tech support"),
            Some(AgentName::TechSupport)
        );
        assert_eq!(
            AgentName::parse_loose("Tech_Support_Agent"),
            Some(AgentName::TechSupport)
        );
        assert_eq!(AgentName::parse_loose("SalesWizard"), None);
    }

    #[test]
    fn agent_display_name_is_spaced() {
        assert_eq!(AgentName::TechSupport.display_name(), "Tech Support Agent");
        assert_eq!(AgentName::Hr.display_name(), "Hr Agent");
    }

    #[test]
    fn roster_contains_human_but_no_coordinators() {
        let roster = AgentName::roster();
        assert!(roster.contains(&AgentName::Human));
        assert!(!roster.contains(&AgentName::Planner));
        assert!(!roster.contains(&AgentName::GroupChatManager));
    }

    #[test]
    fn step_status_terminality() {
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(StepStatus::Rejected.is_terminal());
        assert!(!StepStatus::Planned.is_terminal());
        assert!(!StepStatus::ActionRequested.is_terminal());
    }

    #[test]
    fn new_step_defaults() {
        let step = Step::new("p1", "s1", "u1", "Do the thing", AgentName::Hr);
        assert_eq!(step.status, StepStatus::Planned);
        assert_eq!(step.human_approval_status, HumanApprovalStatus::Requested);
        assert!(step.agent_reply.is_none());
    }

    #[test]
    fn plan_with_steps_counts_and_completion() {
        let plan = Plan::new("s1", "u1", "goal");
        let mut s1 = Step::new(&plan.id, "s1", "u1", "a", AgentName::Hr);
        s1.status = StepStatus::Completed;
        let mut s2 = Step::new(&plan.id, "s1", "u1", "b", AgentName::Human);
        s2.status = StepStatus::Failed;
        let pws = PlanWithSteps::assemble(plan, vec![s1, s2]);
        assert_eq!(pws.total_steps, 2);
        assert_eq!(pws.completed, 1);
        assert_eq!(pws.failed, 1);
        assert_eq!(pws.plan.overall_status, PlanStatus::Completed);
    }

    #[test]
    fn plan_with_open_steps_stays_in_progress() {
        let plan = Plan::new("s1", "u1", "goal");
        let s1 = Step::new(&plan.id, "s1", "u1", "a", AgentName::Hr);
        let pws = PlanWithSteps::assemble(plan, vec![s1]);
        assert_eq!(pws.plan.overall_status, PlanStatus::InProgress);
    }

    #[test]
    fn plan_round_trips_through_json() {
        let plan = Plan::new("s1", "u1", "Onboard Jessica Smith");
        let json = serde_json::to_string(&plan).unwrap();
        let back: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, plan.id);
        assert_eq!(back.initial_goal, plan.initial_goal);
        assert_eq!(back.overall_status, PlanStatus::InProgress);
        assert_eq!(back.source, "PlannerAgent");
    }

    #[test]
    fn step_status_serialises_snake_case() {
        let json = serde_json::to_string(&StepStatus::ActionRequested).unwrap();
        assert_eq!(json, "\"action_requested\"");
    }
}
