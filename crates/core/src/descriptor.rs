//! Feature descriptors
//!
//! A [`FeatureDescriptor`] is the persisted output of one feature module for
//! one segment: the segment id plus the named fields the owning module
//! declared in its entity schema.

use crate::error::{VitrumError, VitrumResult};
use crate::traits::{Row, FEATURE_FIELD, ID_FIELD};
use crate::value::PrimitiveValue;

/// Backend-agnostic descriptor keyed by segment id
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDescriptor {
    /// Segment id
    pub id: String,
    /// Named fields besides the id
    pub fields: Vec<(String, PrimitiveValue)>,
}

impl FeatureDescriptor {
    /// Create a descriptor without fields
    pub fn new(id: impl Into<String>) -> Self {
        FeatureDescriptor {
            id: id.into(),
            fields: Vec::new(),
        }
    }

    /// Descriptor holding free text in the `feature` field
    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id).with_field(FEATURE_FIELD, PrimitiveValue::String(text.into()))
    }

    /// Descriptor holding a vector in the `feature` field
    pub fn vector(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self::new(id).with_field(FEATURE_FIELD, PrimitiveValue::FloatVector(vector))
    }

    /// Builder: add a field
    pub fn with_field(mut self, name: impl Into<String>, value: PrimitiveValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    /// Get a field by name
    pub fn field(&self, name: &str) -> Option<&PrimitiveValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Convert into a storage row
    pub fn to_row(&self) -> Row {
        let mut row = Row::with_capacity(self.fields.len() + 1);
        row.insert(ID_FIELD.to_string(), PrimitiveValue::String(self.id.clone()));
        for (name, value) in &self.fields {
            row.insert(name.clone(), value.clone());
        }
        row
    }

    /// Rebuild from a storage row; every column other than the id becomes a field
    ///
    /// # Errors
    ///
    /// Returns `VitrumError::Lookup` if the id column is missing or not a string.
    pub fn from_row(row: &Row) -> VitrumResult<Self> {
        let id = row
            .get(ID_FIELD)
            .and_then(PrimitiveValue::as_str)
            .ok_or_else(|| VitrumError::lookup("Could not read column 'id' for descriptor"))?
            .to_string();
        let mut fields: Vec<(String, PrimitiveValue)> = row
            .iter()
            .filter(|(k, _)| k.as_str() != ID_FIELD)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(FeatureDescriptor { id, fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_descriptor_row() {
        let row = FeatureDescriptor::text("s1", "a dog").to_row();
        assert_eq!(row[ID_FIELD], PrimitiveValue::from("s1"));
        assert_eq!(row[FEATURE_FIELD], PrimitiveValue::from("a dog"));
    }

    #[test]
    fn test_from_row() {
        let row = FeatureDescriptor::vector("s2", vec![0.5, 0.25]).to_row();
        let back = FeatureDescriptor::from_row(&row).unwrap();
        assert_eq!(back.id, "s2");
        assert_eq!(
            back.field(FEATURE_FIELD).and_then(PrimitiveValue::as_vector),
            Some(&[0.5f32, 0.25][..])
        );
    }

    #[test]
    fn test_from_row_without_id() {
        let row = Row::new();
        assert!(FeatureDescriptor::from_row(&row).is_err());
    }
}
