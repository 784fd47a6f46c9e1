// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Agent implementations: the Base Specialist execution loop, the Planner,
//! the Human-in-the-Loop agent, and the Roster that binds specialists to
//! their tool slices.

mod human;
mod messages;
mod planner;
pub mod prompts;
mod roster;
mod specialist;

pub use human::HumanAgent;
pub use messages::{
    ActionRequest, ActionResponse, ApprovalSignal, HumanClarification, HumanFeedback, InputTask,
};
pub use planner::{Planner, PlannerResponsePlan, PlannerResponseStep};
pub use roster::Roster;
pub use specialist::Specialist;
