//! Media object metadata
//!
//! A [`MetadataEntry`] is one key/value fact about a media object within a
//! named domain (EXIF, IPTC, ...). Keys are not unique per object. Entries are
//! never updated in place; corrections are new entries.

use crate::error::{VitrumError, VitrumResult};
use crate::schema::{AttributeDefinition, AttributeType};
use crate::traits::Row;
use crate::value::{PrimitiveValue, ProviderDataType};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Name of the metadata entity in the persistence layer
pub const METADATA_ENTITY: &str = "vitrum_metadata";

/// Field names of the metadata entity, in schema order
pub const METADATA_FIELDS: [&str; 4] = ["objectid", "domain", "key", "value"];

/// One key/value fact about a media object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    object_id: String,
    domain: String,
    key: String,
    value: PrimitiveValue,
    /// Set only for entries loaded from storage; never persisted
    #[serde(skip)]
    exists: bool,
}

impl MetadataEntry {
    /// Create a fresh entry that has not been persisted yet
    pub fn of(
        object_id: impl Into<String>,
        domain: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<PrimitiveValue>,
    ) -> Self {
        MetadataEntry {
            object_id: object_id.into(),
            domain: domain.into(),
            key: key.into(),
            value: value.into(),
            exists: false,
        }
    }

    /// Create a fresh entry from an untyped JSON value
    ///
    /// Unsupported JSON types degrade to `Nothing` (logged, never fails).
    pub fn from_json(
        object_id: impl Into<String>,
        domain: impl Into<String>,
        key: impl Into<String>,
        value: &serde_json::Value,
    ) -> Self {
        Self::of(object_id, domain, key, PrimitiveValue::from_json(value))
    }

    /// Copy an entry onto another object id
    pub fn from_existing(entry: &MetadataEntry, object_id: impl Into<String>) -> Self {
        let object_id = object_id.into();
        if object_id.is_empty() {
            error!(key = %entry.key, "No object id provided for this metadata entry");
        }
        MetadataEntry {
            object_id,
            ..entry.clone()
        }
    }

    /// Rebuild an entry from a stored row
    ///
    /// # Errors
    ///
    /// Returns `VitrumError::Lookup` if `objectid`, `domain` or `key` is
    /// missing or not a string. A missing `value` column reads as `Nothing`.
    pub fn from_row(row: &Row) -> VitrumResult<Self> {
        let object_id = required_string(row, METADATA_FIELDS[0])?;
        let domain = required_string(row, METADATA_FIELDS[1])?;
        let key = required_string(row, METADATA_FIELDS[2])?;
        let value = row
            .get(METADATA_FIELDS[3])
            .cloned()
            .unwrap_or(PrimitiveValue::Nothing);
        Ok(MetadataEntry {
            object_id,
            domain,
            key,
            value,
            exists: true,
        })
    }

    /// Convert into a row for persistence (`exists` is not stored)
    pub fn to_row(&self) -> Row {
        let mut row = Row::with_capacity(4);
        row.insert(METADATA_FIELDS[0].to_string(), self.object_id.clone().into());
        row.insert(METADATA_FIELDS[1].to_string(), self.domain.clone().into());
        row.insert(METADATA_FIELDS[2].to_string(), self.key.clone().into());
        row.insert(METADATA_FIELDS[3].to_string(), self.value.clone());
        row
    }

    /// Schema of the metadata entity
    pub fn attribute_definitions() -> Vec<AttributeDefinition> {
        vec![
            AttributeDefinition::new(METADATA_FIELDS[0], AttributeType::String),
            AttributeDefinition::new(METADATA_FIELDS[1], AttributeType::String),
            AttributeDefinition::new(METADATA_FIELDS[2], AttributeType::String),
            AttributeDefinition::new(METADATA_FIELDS[3], AttributeType::String),
        ]
    }

    /// Id of the media object this entry belongs to
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Metadata domain
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Metadata key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Value rendered as a string; `None` when the value is `Nothing`
    pub fn value(&self) -> Option<String> {
        self.value.get_string()
    }

    /// Typed value
    pub fn value_provider(&self) -> &PrimitiveValue {
        &self.value
    }

    /// Whether this entry was loaded from storage
    pub fn exists(&self) -> bool {
        self.exists
    }
}

fn required_string(row: &Row, field: &str) -> VitrumResult<String> {
    match row.get(field) {
        Some(v) if v.data_type() == ProviderDataType::String => {
            Ok(v.as_str().unwrap_or_default().to_string())
        }
        _ => Err(VitrumError::lookup(format!(
            "Could not read column '{}' for metadata entry",
            field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fresh_entry_does_not_exist() {
        let entry = MetadataEntry::of("v_001", "exif", "Make", "Canon");
        assert!(!entry.exists());
        assert_eq!(entry.value(), Some("Canon".to_string()));
    }

    #[test]
    fn test_row_roundtrip_marks_exists() {
        let entry = MetadataEntry::of("v_001", "exif", "ISO", 400i32);
        let back = MetadataEntry::from_row(&entry.to_row()).unwrap();
        assert!(back.exists());
        assert_eq!(back.object_id(), "v_001");
        assert_eq!(back.domain(), "exif");
        assert_eq!(back.key(), "ISO");
        assert_eq!(back.value_provider(), &PrimitiveValue::Int(400));
    }

    #[test]
    fn test_row_without_exists_column() {
        let row = MetadataEntry::of("o", "d", "k", "v").to_row();
        assert!(!row.contains_key("exists"));
    }

    #[test]
    fn test_missing_column_is_lookup_error() {
        let mut row = MetadataEntry::of("o", "d", "k", "v").to_row();
        row.remove("domain");
        assert!(matches!(
            MetadataEntry::from_row(&row),
            Err(VitrumError::Lookup(_))
        ));
    }

    #[test]
    fn test_unsupported_json_degrades_to_nothing() {
        let entry = MetadataEntry::from_json("o", "iptc", "keywords", &json!(["a", "b"]));
        assert!(entry.value_provider().is_nothing());
        assert_eq!(entry.value(), None);
    }

    #[test]
    fn test_from_existing_rebinds_object() {
        let entry = MetadataEntry::of("a", "d", "k", 1.5f64);
        let moved = MetadataEntry::from_existing(&entry, "b");
        assert_eq!(moved.object_id(), "b");
        assert_eq!(moved.key(), "k");
    }
}
