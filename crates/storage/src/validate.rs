//! Row checks shared by the backends

use vitrum_core::{AttributeDefinition, AttributeType, PrimitiveValue, Row, VitrumError, VitrumResult};

/// Check a row against an entity schema
///
/// Every field must be declared, and vectors must have the declared length.
pub(crate) fn validate_row(
    entity: &str,
    schema: &[AttributeDefinition],
    row: &Row,
) -> VitrumResult<()> {
    for (name, value) in row {
        let def = schema.iter().find(|f| &f.name == name).ok_or_else(|| {
            VitrumError::storage(format!("Unknown field '{}' in entity '{}'", name, entity))
        })?;
        if let (AttributeType::Vector, Some(len), PrimitiveValue::FloatVector(v)) =
            (def.attribute_type, def.length, value)
        {
            if v.len() != len {
                return Err(VitrumError::storage(format!(
                    "Vector field '{}' in entity '{}' expects length {}, got {}",
                    name,
                    entity,
                    len,
                    v.len()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrum_core::ID_FIELD;

    #[test]
    fn test_declared_fields_pass() {
        let schema = vec![
            AttributeDefinition::new(ID_FIELD, AttributeType::String),
            AttributeDefinition::vector("v", 2),
        ];
        let mut row = Row::new();
        row.insert(ID_FIELD.into(), PrimitiveValue::from("a"));
        row.insert("v".into(), PrimitiveValue::FloatVector(vec![0.0, 1.0]));
        assert!(validate_row("e", &schema, &row).is_ok());

        row.insert("v".into(), PrimitiveValue::FloatVector(vec![0.0]));
        assert!(validate_row("e", &schema, &row).is_err());

        row.remove("v");
        row.insert("other".into(), PrimitiveValue::Int(1));
        assert!(validate_row("e", &schema, &row).is_err());
    }
}
