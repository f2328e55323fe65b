//! Schema registry - embedded JSON schemas

use rust_embed::Embed;
use std::collections::HashMap;

#[derive(Embed)]
#[folder = "schemas/"]
struct EmbeddedSchemas;

/// Name of the publish-readiness schema for draft metadata
pub const DRAFT_SCHEMA: &str = "draft";

/// Registry of JSON schemas, keyed by name (`draft` for `draft.schema.json`)
pub struct SchemaRegistry {
    schemas: HashMap<String, String>,
}

impl SchemaRegistry {
    /// Create a new schema registry with embedded schemas
    pub fn new() -> Self {
        let mut schemas = HashMap::new();

        for file in EmbeddedSchemas::iter() {
            let filename = file.as_ref();
            let Some(name) = filename.strip_suffix(".schema.json") else {
                continue;
            };
            if let Some(content) = EmbeddedSchemas::get(filename) {
                if let Ok(content) = std::str::from_utf8(&content.data) {
                    schemas.insert(name.to_string(), content.to_string());
                }
            }
        }

        Self { schemas }
    }

    /// Get a schema by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.schemas.get(name).map(|s| s.as_str())
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
