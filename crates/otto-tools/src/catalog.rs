// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool catalog loading.
//!
//! One JSON file per specialist declares its system message and tools:
//!
//! ```json
//! { "agent_name": "HrAgent",
//!   "system_message": "…",
//!   "tools": [
//!     { "name": "assign_mentor", "description": "…",
//!       "parameters": [ { "name": "employee_name", "type": "string",
//!                         "description": "…" } ],
//!       "response_template": "##### Mentor Assigned\n…{employee_name}…" } ] }
//! ```
//!
//! Tools are registered with an explicit parameter list rather than
//! reflected from function signatures, which keeps the planner's catalog
//! assembly a pure data operation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use otto_store::AgentName;

use crate::{Tool, ToolCall, ToolOutput, ToolRegistry};

/// Shared suffix appended to every built-in tool confirmation.
pub const FORMATTING_INSTRUCTIONS: &str = "Instructions: returning the output of this function \
     call verbatim to the user in markdown. Then write AGENT SUMMARY: and then include a summary \
     of what you did.";

fn default_required() -> bool {
    true
}

/// One specialist's catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCatalog {
    pub agent_name: String,
    pub system_message: String,
    #[serde(default)]
    pub tools: Vec<CatalogTool>,
}

impl AgentCatalog {
    /// Build the registry for this catalog's tool slice.
    pub fn registry(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for tool in &self.tools {
            registry.register(TemplateTool::new(tool.clone()));
        }
        registry
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTool {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
    pub response_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

/// A deterministic tool constructed from a catalog entry.  Renders the
/// response template with the call arguments and appends the shared
/// formatting instructions.  Never performs I/O.
pub struct TemplateTool {
    spec: CatalogTool,
    schema: Value,
}

impl TemplateTool {
    pub fn new(spec: CatalogTool) -> Self {
        let schema = parameters_to_schema(&spec.parameters);
        Self { spec, schema }
    }
}

#[async_trait]
impl Tool for TemplateTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let args = match call.args.as_object() {
            Some(map) => map,
            None => return ToolOutput::err(&call.id, "arguments must be a JSON object"),
        };

        let missing: Vec<&str> = self
            .spec
            .parameters
            .iter()
            .filter(|p| p.required && !args.contains_key(&p.name))
            .map(|p| p.name.as_str())
            .collect();
        if !missing.is_empty() {
            return ToolOutput::err(
                &call.id,
                format!(
                    "missing required argument(s) for {}: {}",
                    self.spec.name,
                    missing.join(", ")
                ),
            );
        }

        let mut rendered = self.spec.response_template.clone();
        for (key, value) in args {
            let placeholder = format!("{{{key}}}");
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&placeholder, &text);
        }

        ToolOutput::ok(&call.id, format!("{rendered}\n{FORMATTING_INSTRUCTIONS}"))
    }
}

/// Compile an explicit parameter list into a JSON-schema object.
fn parameters_to_schema(parameters: &[ParamSpec]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for p in parameters {
        let ty = match p.param_type.as_str() {
            "number" | "integer" | "boolean" => p.param_type.as_str(),
            _ => "string",
        };
        properties.insert(
            p.name.clone(),
            json!({ "type": ty, "description": p.description }),
        );
        if p.required {
            required.push(Value::String(p.name.clone()));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Snake-case tool name prefix for a specialist ("tech_support", "hr", …).
fn snake_prefix(agent: AgentName) -> &'static str {
    match agent {
        AgentName::Hr => "hr",
        AgentName::Marketing => "marketing",
        AgentName::Procurement => "procurement",
        AgentName::Product => "product",
        AgentName::TechSupport => "tech_support",
        AgentName::Generic => "generic",
        AgentName::Human => "human",
        AgentName::Planner => "planner",
        AgentName::GroupChatManager => "group_chat_manager",
    }
}

const EMBEDDED_CATALOGS: &[&str] = &[
    include_str!("../catalogs/hr.json"),
    include_str!("../catalogs/marketing.json"),
    include_str!("../catalogs/procurement.json"),
    include_str!("../catalogs/product.json"),
    include_str!("../catalogs/tech_support.json"),
    include_str!("../catalogs/generic.json"),
];

/// Load the specialist catalogs: the embedded set, overlaid with any
/// `*.json` files found in `dir`.  Every catalog is guaranteed to carry a
/// `<agent>_help_with_tasks` fallback tool.
pub fn load_catalogs(
    dir: Option<&Path>,
) -> anyhow::Result<BTreeMap<AgentName, AgentCatalog>> {
    let mut catalogs: BTreeMap<AgentName, AgentCatalog> = BTreeMap::new();

    for text in EMBEDDED_CATALOGS {
        let catalog: AgentCatalog =
            serde_json::from_str(text).context("parsing embedded tool catalog")?;
        let agent = AgentName::parse_loose(&catalog.agent_name)
            .with_context(|| format!("unknown agent in catalog: {}", catalog.agent_name))?;
        catalogs.insert(agent, catalog);
    }

    if let Some(dir) = dir {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("reading catalog dir {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let catalog: AgentCatalog = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            match AgentName::parse_loose(&catalog.agent_name) {
                Some(agent) => {
                    debug!(agent = %agent, path = %path.display(), "catalog override");
                    catalogs.insert(agent, catalog);
                }
                None => warn!(
                    path = %path.display(),
                    "skipping catalog with unknown agent_name {}", catalog.agent_name
                ),
            }
        }
    }

    for (agent, catalog) in catalogs.iter_mut() {
        ensure_fallback_tool(*agent, catalog);
    }

    Ok(catalogs)
}

/// Every specialist must expose a `<agent>_help_with_tasks` fallback with a
/// single `input` parameter.
fn ensure_fallback_tool(agent: AgentName, catalog: &mut AgentCatalog) {
    let fallback_name = format!("{}_help_with_tasks", snake_prefix(agent));
    if catalog.tools.iter().any(|t| t.name == fallback_name) {
        return;
    }
    catalog.tools.push(CatalogTool {
        name: fallback_name,
        description: format!(
            "Help with any other {} related tasks not covered by a dedicated function.",
            agent.display_name()
        ),
        parameters: vec![ParamSpec {
            name: "input".into(),
            param_type: "string".into(),
            description: "Description of the task to help with.".into(),
            required: true,
        }],
        response_template: "##### Task Assistance\n{input}\n\nThe request has been noted and \
                            handled."
            .into(),
    });
}

/// One row of the flattened tool catalog served by the tools endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCatalogRow {
    pub agent: String,
    pub function: String,
    pub description: String,
    /// JSON-serialised parameter schema.
    pub arguments: String,
}

/// Flatten the catalogs into `{agent, function, description, arguments}`
/// rows for the planner prompt and the tools endpoint.
pub fn flatten_catalogs(catalogs: &BTreeMap<AgentName, AgentCatalog>) -> Vec<ToolCatalogRow> {
    let mut rows = Vec::new();
    for (agent, catalog) in catalogs {
        for tool in &catalog.tools {
            rows.push(ToolCatalogRow {
                agent: agent.as_str().to_string(),
                function: tool.name.clone(),
                description: tool.description.clone(),
                arguments: parameters_to_schema(&tool.parameters).to_string(),
            });
        }
    }
    rows
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tool() -> CatalogTool {
        CatalogTool {
            name: "assign_mentor".into(),
            description: "Assign a mentor to a new employee.".into(),
            parameters: vec![ParamSpec {
                name: "employee_name".into(),
                param_type: "string".into(),
                description: "Name of the employee.".into(),
                required: true,
            }],
            response_template: "##### Mentor Assigned\n**Employee Name:** {employee_name}".into(),
        }
    }

    #[tokio::test]
    async fn template_tool_renders_arguments() {
        let tool = TemplateTool::new(sample_tool());
        let out = tool
            .execute(&ToolCall {
                id: "c1".into(),
                name: "assign_mentor".into(),
                args: json!({"employee_name": "Jessica Smith"}),
            })
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("**Employee Name:** Jessica Smith"));
        assert!(out.content.contains("AGENT SUMMARY"));
    }

    #[tokio::test]
    async fn template_tool_rejects_missing_required() {
        let tool = TemplateTool::new(sample_tool());
        let out = tool
            .execute(&ToolCall {
                id: "c1".into(),
                name: "assign_mentor".into(),
                args: json!({}),
            })
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("employee_name"));
    }

    #[tokio::test]
    async fn template_tool_renders_non_string_values() {
        let spec = CatalogTool {
            name: "order_hardware".into(),
            description: "Order hardware.".into(),
            parameters: vec![
                ParamSpec {
                    name: "item_name".into(),
                    param_type: "string".into(),
                    description: "Item.".into(),
                    required: true,
                },
                ParamSpec {
                    name: "quantity".into(),
                    param_type: "integer".into(),
                    description: "How many.".into(),
                    required: true,
                },
            ],
            response_template: "Ordered {quantity} of {item_name}.".into(),
        };
        let tool = TemplateTool::new(spec);
        let out = tool
            .execute(&ToolCall {
                id: "c1".into(),
                name: "order_hardware".into(),
                args: json!({"item_name": "laptop", "quantity": 3}),
            })
            .await;
        assert!(out.content.contains("Ordered 3 of laptop."));
    }

    #[test]
    fn schema_includes_required_list() {
        let schema = parameters_to_schema(&sample_tool().parameters);
        assert_eq!(schema["type"], json!("object"));
        assert_eq!(schema["required"], json!(["employee_name"]));
        assert_eq!(
            schema["properties"]["employee_name"]["type"],
            json!("string")
        );
    }

    #[test]
    fn embedded_catalogs_load_and_carry_fallbacks() {
        let catalogs = load_catalogs(None).unwrap();
        assert!(catalogs.contains_key(&AgentName::Hr));
        assert!(catalogs.contains_key(&AgentName::Generic));
        for (agent, catalog) in &catalogs {
            let fallback = format!("{}_help_with_tasks", snake_prefix(*agent));
            assert!(
                catalog.tools.iter().any(|t| t.name == fallback),
                "{agent} catalog lacks {fallback}"
            );
        }
    }

    #[test]
    fn embedded_catalogs_contain_scenario_tools() {
        let catalogs = load_catalogs(None).unwrap();
        let tech = &catalogs[&AgentName::TechSupport];
        assert!(tech.tools.iter().any(|t| t.name == "grant_database_access"));
        let marketing = &catalogs[&AgentName::Marketing];
        assert!(marketing
            .tools
            .iter()
            .any(|t| t.name == "generate_press_release"));
        let hr = &catalogs[&AgentName::Hr];
        assert!(hr.tools.iter().any(|t| t.name == "schedule_orientation_session"));
    }

    #[test]
    fn catalog_dir_overrides_embedded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("generic.json"),
            r#"{ "agent_name": "GenericAgent",
                 "system_message": "You are a custom generic assistant.",
                 "tools": [] }"#,
        )
        .unwrap();
        let catalogs = load_catalogs(Some(dir.path())).unwrap();
        assert_eq!(
            catalogs[&AgentName::Generic].system_message,
            "You are a custom generic assistant."
        );
        // The fallback is still synthesised for the override.
        assert!(catalogs[&AgentName::Generic]
            .tools
            .iter()
            .any(|t| t.name == "generic_help_with_tasks"));
    }

    #[test]
    fn flatten_produces_one_row_per_tool() {
        let catalogs = load_catalogs(None).unwrap();
        let rows = flatten_catalogs(&catalogs);
        let total: usize = catalogs.values().map(|c| c.tools.len()).sum();
        assert_eq!(rows.len(), total);
        assert!(rows
            .iter()
            .any(|r| r.agent == "TechSupportAgent" && r.function == "grant_database_access"));
    }

    #[test]
    fn registry_built_from_catalog_executes() {
        let catalogs = load_catalogs(None).unwrap();
        let registry = catalogs[&AgentName::Hr].registry();
        assert!(registry.get("assign_mentor").is_some());
    }
}
