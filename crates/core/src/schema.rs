//! Entity schema declarations
//!
//! Feature modules declare their entities once, at creation time, as a list
//! of [`AttributeDefinition`]s. Backends read the semantic type and the hints
//! map to decide how a field is stored (e.g. `handler = "fulltext"`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hint key selecting the storage handler for a field
pub const HINT_HANDLER: &str = "handler";

/// Handler value routing a field to the fulltext index
pub const HANDLER_FULLTEXT: &str = "fulltext";

/// Semantic type of an entity field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttributeType {
    /// Short string, exact match only
    String,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// Dense float vector
    Vector,
    /// Free text, eligible for fulltext search
    Text,
}

/// One field of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Field name
    pub name: String,
    /// Semantic type
    pub attribute_type: AttributeType,
    /// Vector length, only meaningful for [`AttributeType::Vector`]
    pub length: Option<usize>,
    /// Backend-specific hints
    pub hints: HashMap<String, String>,
}

impl AttributeDefinition {
    /// Create a definition without hints
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        AttributeDefinition {
            name: name.into(),
            attribute_type,
            length: None,
            hints: HashMap::new(),
        }
    }

    /// Create a vector definition with a fixed length
    pub fn vector(name: impl Into<String>, length: usize) -> Self {
        AttributeDefinition {
            length: Some(length),
            ..Self::new(name, AttributeType::Vector)
        }
    }

    /// Builder: add a hint
    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }

    /// Builder: replace all hints
    pub fn with_hints(mut self, hints: HashMap<String, String>) -> Self {
        self.hints = hints;
        self
    }

    /// Get a hint value
    pub fn hint(&self, key: &str) -> Option<&str> {
        self.hints.get(key).map(String::as_str)
    }

    /// Whether a fulltext backend should tokenize and index this field
    pub fn is_fulltext(&self) -> bool {
        self.attribute_type == AttributeType::Text
    }

    /// Whether the field asks to be handled by the fulltext engine
    pub fn prefers_fulltext_handler(&self) -> bool {
        self.hint(HINT_HANDLER) == Some(HANDLER_FULLTEXT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_fulltext() {
        assert!(AttributeDefinition::new("feature", AttributeType::Text).is_fulltext());
        assert!(!AttributeDefinition::new("id", AttributeType::String).is_fulltext());
    }

    #[test]
    fn test_handler_hint() {
        let def = AttributeDefinition::new("id", AttributeType::String)
            .with_hint(HINT_HANDLER, HANDLER_FULLTEXT);
        assert!(def.prefers_fulltext_handler());
        assert!(!def.is_fulltext());
        assert_eq!(def.hint(HINT_HANDLER), Some("fulltext"));
    }

    #[test]
    fn test_vector_length() {
        let def = AttributeDefinition::vector("feature", 12);
        assert_eq!(def.attribute_type, AttributeType::Vector);
        assert_eq!(def.length, Some(12));
    }
}
