//! Agent definition validation
//!
//! A draft becomes an Agent only after the invariants hold: non-empty name,
//! non-empty system prompt, recognized model, every listed tool resolvable
//! in the registry, every referenced document present.

use crate::tools::ToolRegistry;
use renum_core::{DocumentId, RenumError, RenumResult, TenantId, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Models the platform recognizes for agent definitions.
pub const RECOGNIZED_MODELS: [&str; 6] = [
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4.1",
    "gpt-4.1-mini",
    "o3-mini",
    "gpt-3.5-turbo",
];

/// Whether a model identifier is recognized.
pub fn is_recognized_model(model: &str) -> bool {
    RECOGNIZED_MODELS.contains(&model)
}

/// An agent definition before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AgentDraft {
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: String,
    pub model: String,
    pub category: Option<String>,
    /// Tool names; each must resolve in the registry.
    pub tools: Vec<String>,
    /// Knowledge documents scoping the agent's RAG retrieval.
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>))]
    pub document_ids: Vec<DocumentId>,
}

impl AgentDraft {
    /// Validate the draft against the registry and the set of documents that
    /// exist for this tenant.
    pub fn validate(
        &self,
        registry: &ToolRegistry,
        tenant_id: TenantId,
        existing_documents: &HashSet<DocumentId>,
    ) -> RenumResult<()> {
        if self.name.trim().is_empty() {
            return Err(RenumError::Validation(ValidationError::RequiredFieldMissing {
                field: "name".to_string(),
            }));
        }
        if self.system_prompt.trim().is_empty() {
            return Err(RenumError::Validation(ValidationError::RequiredFieldMissing {
                field: "system_prompt".to_string(),
            }));
        }
        if !is_recognized_model(&self.model) {
            return Err(RenumError::Validation(ValidationError::UnknownModel {
                model: self.model.clone(),
            }));
        }

        // UnknownTool propagates; entitlement filtering is a runtime concern.
        registry.resolve(&self.tools, tenant_id)?;

        for document_id in &self.document_ids {
            if !existing_documents.contains(document_id) {
                return Err(RenumError::Validation(ValidationError::MissingDocument {
                    document_id: *document_id,
                }));
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use renum_core::new_entity_id;

    fn draft() -> AgentDraft {
        AgentDraft {
            name: "Suporte".to_string(),
            description: None,
            system_prompt: "Você é o agente de suporte.".to_string(),
            model: "gpt-4o-mini".to_string(),
            category: Some("support".to_string()),
            tools: vec!["current_time".to_string()],
            document_ids: vec![],
        }
    }

    #[test]
    fn test_valid_draft_passes() {
        let registry = ToolRegistry::with_defaults();
        assert!(draft().validate(&registry, new_entity_id(), &HashSet::new()).is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = ToolRegistry::with_defaults();
        let mut bad = draft();
        bad.name = "   ".to_string();
        let err = bad
            .validate(&registry, new_entity_id(), &HashSet::new())
            .unwrap_err();
        assert!(matches!(
            err,
            RenumError::Validation(ValidationError::RequiredFieldMissing { ref field }) if field == "name"
        ));
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let registry = ToolRegistry::with_defaults();
        let mut bad = draft();
        bad.system_prompt = String::new();
        assert!(bad
            .validate(&registry, new_entity_id(), &HashSet::new())
            .is_err());
    }

    #[test]
    fn test_unknown_model_rejected() {
        let registry = ToolRegistry::with_defaults();
        let mut bad = draft();
        bad.model = "llama-unknown".to_string();
        let err = bad
            .validate(&registry, new_entity_id(), &HashSet::new())
            .unwrap_err();
        assert!(matches!(
            err,
            RenumError::Validation(ValidationError::UnknownModel { .. })
        ));
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let registry = ToolRegistry::with_defaults();
        let mut bad = draft();
        bad.tools.push("nonexistent_tool".to_string());
        assert!(bad
            .validate(&registry, new_entity_id(), &HashSet::new())
            .is_err());
    }

    #[test]
    fn test_missing_document_rejected() {
        let registry = ToolRegistry::with_defaults();
        let known = new_entity_id();
        let unknown = new_entity_id();

        let mut ok = draft();
        ok.document_ids = vec![known];
        let existing: HashSet<_> = [known].into_iter().collect();
        assert!(ok.validate(&registry, new_entity_id(), &existing).is_ok());

        let mut bad = draft();
        bad.document_ids = vec![unknown];
        let err = bad.validate(&registry, new_entity_id(), &existing).unwrap_err();
        assert!(matches!(
            err,
            RenumError::Validation(ValidationError::MissingDocument { .. })
        ));
    }
}
