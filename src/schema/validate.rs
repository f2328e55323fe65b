//! Publish-readiness checks for drafts

use serde_json::Value;
use thiserror::Error;

use crate::core::identity::Identity;
use crate::entities::record::Record;
use crate::schema::registry::{SchemaRegistry, DRAFT_SCHEMA};

/// A draft failed the publish-readiness check
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Draft is not ready to publish: {}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

impl ValidationError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
        }
    }
}

/// Decides whether a draft may be submitted or published
pub trait DraftValidator: Send + Sync {
    fn validate_draft(&self, identity: &Identity, draft: &Record) -> Result<(), ValidationError>;
}

/// Validates draft metadata against the embedded JSON schema
pub struct SchemaValidator {
    validator: jsonschema::Validator,
}

impl SchemaValidator {
    /// Validator for the embedded `draft` schema
    pub fn new() -> Result<Self, ValidationError> {
        let registry = SchemaRegistry::new();
        let raw = registry
            .get(DRAFT_SCHEMA)
            .ok_or_else(|| ValidationError::new("draft schema is not embedded"))?;
        let schema: Value = serde_json::from_str(raw)
            .map_err(|e| ValidationError::new(format!("Invalid draft schema: {}", e)))?;
        Self::from_schema(&schema)
    }

    pub fn from_schema(schema: &Value) -> Result<Self, ValidationError> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|e| ValidationError::new(format!("Invalid schema: {}", e)))?;
        Ok(Self { validator })
    }

    /// Collect every schema violation of a JSON document
    pub fn errors_for(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect()
    }
}

impl DraftValidator for SchemaValidator {
    fn validate_draft(&self, _identity: &Identity, draft: &Record) -> Result<(), ValidationError> {
        let metadata = serde_json::to_value(&draft.metadata)
            .map_err(|e| ValidationError::new(format!("Unserializable metadata: {}", e)))?;
        let errors = self.errors_for(&metadata);
        if errors.is_empty() {
            Ok(())
        } else {
            tracing::debug!(record_id = %draft.id, ?errors, "draft failed validation");
            Err(ValidationError { errors })
        }
    }
}
