//! Agent import wizard
//!
//! Converts an externally described workflow (an n8n export: a JSON with
//! named nodes, some of which carry a system-prompt fragment) into the raw
//! material of an agent definition. The converter is pure: importing the
//! same JSON twice yields identical output.

use renum_core::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How many node names the description lists before truncating.
const DESCRIPTION_NODE_LIMIT: usize = 10;

/// Result of converting one workflow export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WorkflowImport {
    /// Workflow name, used as the agent name suggestion.
    pub name: String,
    /// Human-readable provenance line listing the imported nodes.
    pub description: String,
    /// All node system-prompt fragments, joined by a blank line.
    pub system_prompt_hint: String,
    /// Total nodes seen in the workflow.
    pub node_count: usize,
}

/// Convert an n8n workflow export into agent definition material.
pub fn import_n8n_workflow(workflow: &Value) -> Result<WorkflowImport, ValidationError> {
    let name = workflow
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("Workflow importado")
        .to_string();

    let nodes = workflow
        .get("nodes")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ValidationError::RequiredFieldMissing {
            field: "nodes".to_string(),
        })?;

    let mut node_names = Vec::with_capacity(nodes.len());
    let mut fragments = Vec::new();

    for (index, node) in nodes.iter().enumerate() {
        let node_name = node
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("node_{}", index + 1));
        node_names.push(node_name);

        if let Some(message) = extract_system_message(node) {
            if !message.trim().is_empty() {
                fragments.push(message.trim().to_string());
            }
        }
    }

    let description = render_description(&node_names);
    let system_prompt_hint = fragments.join("\n\n");

    Ok(WorkflowImport {
        name,
        description,
        system_prompt_hint,
        node_count: node_names.len(),
    })
}

/// n8n stores the agent prompt either directly in the node parameters or
/// under the `options` bag, depending on the node version.
fn extract_system_message(node: &Value) -> Option<String> {
    let parameters = node.get("parameters")?;
    if let Some(message) = parameters.get("systemMessage").and_then(|v| v.as_str()) {
        return Some(message.to_string());
    }
    parameters
        .get("options")
        .and_then(|o| o.get("systemMessage"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn render_description(node_names: &[String]) -> String {
    let listed = &node_names[..node_names.len().min(DESCRIPTION_NODE_LIMIT)];
    let mut description = format!("Importado de n8n: {}", listed.join(", "));
    let remaining = node_names.len().saturating_sub(DESCRIPTION_NODE_LIMIT);
    if remaining > 0 {
        description.push_str(&format!(" … e mais {} nós.", remaining));
    }
    description
}

// =============================================================================
// TESTS
// =============================================================================
