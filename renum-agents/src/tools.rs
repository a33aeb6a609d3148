//! Declarative tool registry
//!
//! The registry is process-wide immutable state loaded at start; hot-reload
//! is out of scope. `resolve` turns a tool-name set into callable
//! descriptors in input order, dropping tools the tenant is not entitled to
//! and failing on names nobody registered.

use async_trait::async_trait;
use chrono::Utc;
use renum_core::{RenumError, RenumResult, TenantId, ToolError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// ============================================================================
// DESCRIPTORS
// ============================================================================

/// Tenant entitlement predicate for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ToolScope {
    /// Every tenant may use the tool.
    Global,
    /// Only the listed tenants may use the tool.
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>))]
    Tenants(HashSet<TenantId>),
}

impl ToolScope {
    /// Whether the given tenant is entitled to the tool.
    pub fn allows(&self, tenant_id: TenantId) -> bool {
        match self {
            Self::Global => true,
            Self::Tenants(tenants) => tenants.contains(&tenant_id),
        }
    }
}

/// Declarative description of one tool: name, parameter schema, and the
/// tenant-scope predicate. Purely data; invocation lives on the `Tool` trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool parameters.
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub parameters: Value,
    pub scope: ToolScope,
}

// ============================================================================
// TOOL TRAIT
// ============================================================================

/// A sandboxed capability an agent may invoke inside a turn.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The declarative descriptor for this tool.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Execute the tool with validated-enough arguments.
    /// Errors are captured into the turn's reply metadata, never raised to
    /// the caller.
    async fn invoke(&self, arguments: &Value) -> Result<Value, ToolError>;
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Process-wide immutable tool registry.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Start building a registry.
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder { tools: Vec::new() }
    }

    /// Registry with the built-in platform tools registered.
    pub fn with_defaults() -> Self {
        Self::builder()
            .register(Arc::new(CurrentTimeTool::new()))
            .register(Arc::new(CalculatorTool::new()))
            .build()
    }

    /// Resolve a tool-name set into descriptors, in input order.
    ///
    /// Tools the tenant is not entitled to are dropped silently; names that
    /// resolve to nothing at all fail with `UnknownTool`.
    pub fn resolve(
        &self,
        tool_names: &[String],
        tenant_id: TenantId,
    ) -> RenumResult<Vec<ToolDescriptor>> {
        let mut descriptors = Vec::with_capacity(tool_names.len());
        for name in tool_names {
            let index = self.by_name.get(name).ok_or_else(|| {
                RenumError::Tool(ToolError::UnknownTool { name: name.clone() })
            })?;
            let descriptor = self.tools[*index].descriptor();
            if descriptor.scope.allows(tenant_id) {
                descriptors.push(descriptor.clone());
            }
        }
        Ok(descriptors)
    }

    /// Look up a tool implementation by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.by_name.get(name).map(|i| self.tools[*i].clone())
    }

    /// Whether a name is registered at all.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Registered tool count.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.by_name.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for the immutable registry.
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    /// Register one tool. Later registrations with the same name win.
    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> ToolRegistry {
        let mut by_name = HashMap::with_capacity(self.tools.len());
        for (index, tool) in self.tools.iter().enumerate() {
            by_name.insert(tool.descriptor().name.clone(), index);
        }
        ToolRegistry {
            tools: self.tools,
            by_name,
        }
    }
}

// ============================================================================
// BUILT-IN TOOLS
// ============================================================================

/// Returns the current UTC time.
pub struct CurrentTimeTool {
    descriptor: ToolDescriptor,
}

impl CurrentTimeTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "current_time".to_string(),
                description: "Current date and time in UTC (RFC 3339)".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": false
                }),
                scope: ToolScope::Global,
            },
        }
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, _arguments: &Value) -> Result<Value, ToolError> {
        Ok(json!({ "now": Utc::now().to_rfc3339() }))
    }
}

/// Evaluates a two-operand arithmetic expression.
pub struct CalculatorTool {
    descriptor: ToolDescriptor,
}

impl CalculatorTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "calculator".to_string(),
                description: "Evaluate a basic arithmetic operation".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "a": { "type": "number" },
                        "b": { "type": "number" },
                        "op": { "type": "string", "enum": ["add", "sub", "mul", "div"] }
                    },
                    "required": ["a", "b", "op"]
                }),
                scope: ToolScope::Global,
            },
        }
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, arguments: &Value) -> Result<Value, ToolError> {
        let get = |key: &str| -> Result<f64, ToolError> {
            arguments
                .get(key)
                .and_then(|v| v.as_f64())
                .ok_or_else(|| ToolError::ExecutionFailed {
                    name: "calculator".to_string(),
                    reason: format!("missing numeric argument '{}'", key),
                })
        };
        let a = get("a")?;
        let b = get("b")?;
        let op = arguments.get("op").and_then(|v| v.as_str()).unwrap_or("add");

        let result = match op {
            "add" => a + b,
            "sub" => a - b,
            "mul" => a * b,
            "div" => {
                if b == 0.0 {
                    return Err(ToolError::ExecutionFailed {
                        name: "calculator".to_string(),
                        reason: "division by zero".to_string(),
                    });
                }
                a / b
            }
            other => {
                return Err(ToolError::ExecutionFailed {
                    name: "calculator".to_string(),
                    reason: format!("unknown op '{}'", other),
                })
            }
        };
        Ok(json!({ "result": result }))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use renum_core::new_entity_id;

    fn scoped_tool(name: &str, scope: ToolScope) -> Arc<dyn Tool> {
        struct Fixed(ToolDescriptor);

        #[async_trait]
        impl Tool for Fixed {
            fn descriptor(&self) -> &ToolDescriptor {
                &self.0
            }
            async fn invoke(&self, _arguments: &Value) -> Result<Value, ToolError> {
                Ok(json!({ "ok": true }))
            }
        }

        Arc::new(Fixed(ToolDescriptor {
            name: name.to_string(),
            description: String::new(),
            parameters: json!({"type": "object"}),
            scope,
        }))
    }

    #[test]
    fn test_resolve_preserves_input_order() {
        let registry = ToolRegistry::with_defaults();
        let tenant = new_entity_id();
        let names = vec!["calculator".to_string(), "current_time".to_string()];
        let resolved = registry.resolve(&names, tenant).unwrap();
        assert_eq!(resolved[0].name, "calculator");
        assert_eq!(resolved[1].name, "current_time");
    }

    #[test]
    fn test_resolve_unknown_tool_fails() {
        let registry = ToolRegistry::with_defaults();
        let err = registry
            .resolve(&["crm_lookup".to_string()], new_entity_id())
            .unwrap_err();
        assert!(matches!(
            err,
            RenumError::Tool(ToolError::UnknownTool { ref name }) if name == "crm_lookup"
        ));
    }

    #[test]
    fn test_resolve_drops_non_entitled_tools() {
        let entitled = new_entity_id();
        let other = new_entity_id();
        let registry = ToolRegistry::builder()
            .register(scoped_tool("open", ToolScope::Global))
            .register(scoped_tool(
                "premium",
                ToolScope::Tenants([entitled].into_iter().collect()),
            ))
            .build();

        let names = vec!["open".to_string(), "premium".to_string()];

        let for_entitled = registry.resolve(&names, entitled).unwrap();
        assert_eq!(for_entitled.len(), 2);

        let for_other = registry.resolve(&names, other).unwrap();
        assert_eq!(for_other.len(), 1);
        assert_eq!(for_other[0].name, "open");
    }

    #[tokio::test]
    async fn test_calculator_tool() {
        let tool = CalculatorTool::new();
        let result = tool
            .invoke(&json!({"a": 6, "b": 7, "op": "mul"}))
            .await
            .unwrap();
        assert_eq!(result["result"], json!(42.0));
    }

    #[tokio::test]
    async fn test_calculator_division_by_zero_is_tool_error() {
        let tool = CalculatorTool::new();
        let err = tool
            .invoke(&json!({"a": 1, "b": 0, "op": "div"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_current_time_tool_returns_rfc3339() {
        let tool = CurrentTimeTool::new();
        let result = tool.invoke(&json!({})).await.unwrap();
        assert!(result["now"].as_str().unwrap().contains('T'));
    }
}
