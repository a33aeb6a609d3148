//! Renum Agents - Tools, Wizard, and Routing
//!
//! Declarative tool registry (immutable after start), agent definition
//! validation, the n8n import wizard, and the per-turn sub-agent routing
//! policy. Everything here is pure coordination logic; persistence and
//! transport live in the API crate.

pub mod registry;
pub mod routing;
pub mod tools;
pub mod wizard;

pub use registry::{is_recognized_model, AgentDraft, RECOGNIZED_MODELS};
pub use routing::{detect_handoff, select_sub_agent, RoutingSignal};
pub use tools::{
    CalculatorTool, CurrentTimeTool, Tool, ToolDescriptor, ToolRegistry, ToolRegistryBuilder,
    ToolScope,
};
pub use wizard::{import_n8n_workflow, WorkflowImport};
