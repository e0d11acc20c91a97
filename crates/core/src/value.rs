//! Primitive cell values
//!
//! This module defines:
//! - ProviderDataType: discriminant of a stored cell
//! - PrimitiveValue: tagged union returned by every storage read
//!
//! ## Type Rules
//!
//! - Values read from storage always carry a concrete tag
//! - Values synthesized from unsupported sources degrade to `Nothing`
//! - Lossless accessors (`as_*`) never convert between tags
//! - Coercing getters (`get_*`) convert between numeric widths the way a
//!   reader of a loosely typed backend expects

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Discriminant of a [`PrimitiveValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderDataType {
    /// UTF-8 string
    String,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// 16-bit signed integer
    Short,
    /// 8-bit signed integer
    Byte,
    /// Dense float vector
    FloatVector,
    /// No value
    Nothing,
}

/// Universal cell type for storage reads and writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PrimitiveValue {
    /// UTF-8 string
    String(String),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// 16-bit signed integer
    Short(i16),
    /// 8-bit signed integer
    Byte(i8),
    /// Dense float vector (feature descriptors)
    FloatVector(Vec<f32>),
    /// No value: unsupported source or absent cell
    Nothing,
}

impl PrimitiveValue {
    /// Tag of this value
    pub fn data_type(&self) -> ProviderDataType {
        match self {
            PrimitiveValue::String(_) => ProviderDataType::String,
            PrimitiveValue::Int(_) => ProviderDataType::Int,
            PrimitiveValue::Long(_) => ProviderDataType::Long,
            PrimitiveValue::Float(_) => ProviderDataType::Float,
            PrimitiveValue::Double(_) => ProviderDataType::Double,
            PrimitiveValue::Short(_) => ProviderDataType::Short,
            PrimitiveValue::Byte(_) => ProviderDataType::Byte,
            PrimitiveValue::FloatVector(_) => ProviderDataType::FloatVector,
            PrimitiveValue::Nothing => ProviderDataType::Nothing,
        }
    }

    /// Check if this is the `Nothing` value
    pub fn is_nothing(&self) -> bool {
        matches!(self, PrimitiveValue::Nothing)
    }

    /// Check if this value is numeric (any integer or float width)
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            PrimitiveValue::Int(_)
                | PrimitiveValue::Long(_)
                | PrimitiveValue::Float(_)
                | PrimitiveValue::Double(_)
                | PrimitiveValue::Short(_)
                | PrimitiveValue::Byte(_)
        )
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PrimitiveValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as &[f32] if this is a FloatVector value
    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            PrimitiveValue::FloatVector(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric value widened to f64, `None` for non-numeric values
    pub fn get_double(&self) -> Option<f64> {
        match self {
            PrimitiveValue::Int(v) => Some(*v as f64),
            PrimitiveValue::Long(v) => Some(*v as f64),
            PrimitiveValue::Float(v) => Some(*v as f64),
            PrimitiveValue::Double(v) => Some(*v),
            PrimitiveValue::Short(v) => Some(*v as f64),
            PrimitiveValue::Byte(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Numeric value narrowed to f32, `None` for non-numeric values
    pub fn get_float(&self) -> Option<f32> {
        self.get_double().map(|v| v as f32)
    }

    /// Integral value widened to i64; floats are truncated
    pub fn get_long(&self) -> Option<i64> {
        match self {
            PrimitiveValue::Int(v) => Some(*v as i64),
            PrimitiveValue::Long(v) => Some(*v),
            PrimitiveValue::Short(v) => Some(*v as i64),
            PrimitiveValue::Byte(v) => Some(*v as i64),
            PrimitiveValue::Float(v) => Some(*v as i64),
            PrimitiveValue::Double(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// String rendering of scalar values; `None` for `Nothing`
    ///
    /// Numeric values render in their canonical decimal form, vectors as a
    /// bracketed list.
    pub fn get_string(&self) -> Option<String> {
        match self {
            PrimitiveValue::Nothing => None,
            PrimitiveValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Convert a JSON value into a primitive value
    ///
    /// Strings and numbers are supported. Everything else (null, booleans,
    /// arrays, objects) degrades to `Nothing` and is logged; this never fails.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => PrimitiveValue::String(s.clone()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => PrimitiveValue::Int(small),
                        Err(_) => PrimitiveValue::Long(i),
                    }
                } else if let Some(f) = n.as_f64() {
                    PrimitiveValue::Double(f)
                } else {
                    warn!(value = %n, "Numeric value out of range, degrading to nothing");
                    PrimitiveValue::Nothing
                }
            }
            serde_json::Value::Null => {
                warn!("Value was null");
                PrimitiveValue::Nothing
            }
            other => {
                warn!(value = %other, "Value type not supported, degrading to nothing");
                PrimitiveValue::Nothing
            }
        }
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveValue::String(s) => write!(f, "{}", s),
            PrimitiveValue::Int(v) => write!(f, "{}", v),
            PrimitiveValue::Long(v) => write!(f, "{}", v),
            PrimitiveValue::Float(v) => write!(f, "{}", v),
            PrimitiveValue::Double(v) => write!(f, "{}", v),
            PrimitiveValue::Short(v) => write!(f, "{}", v),
            PrimitiveValue::Byte(v) => write!(f, "{}", v),
            PrimitiveValue::FloatVector(v) => write!(f, "{:?}", v),
            PrimitiveValue::Nothing => write!(f, "nothing"),
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<&str> for PrimitiveValue {
    fn from(s: &str) -> Self {
        PrimitiveValue::String(s.to_string())
    }
}

impl From<String> for PrimitiveValue {
    fn from(s: String) -> Self {
        PrimitiveValue::String(s)
    }
}

impl From<i32> for PrimitiveValue {
    fn from(v: i32) -> Self {
        PrimitiveValue::Int(v)
    }
}

impl From<i64> for PrimitiveValue {
    fn from(v: i64) -> Self {
        PrimitiveValue::Long(v)
    }
}

impl From<f32> for PrimitiveValue {
    fn from(v: f32) -> Self {
        PrimitiveValue::Float(v)
    }
}

impl From<f64> for PrimitiveValue {
    fn from(v: f64) -> Self {
        PrimitiveValue::Double(v)
    }
}

impl From<i16> for PrimitiveValue {
    fn from(v: i16) -> Self {
        PrimitiveValue::Short(v)
    }
}

impl From<i8> for PrimitiveValue {
    fn from(v: i8) -> Self {
        PrimitiveValue::Byte(v)
    }
}

impl From<Vec<f32>> for PrimitiveValue {
    fn from(v: Vec<f32>) -> Self {
        PrimitiveValue::FloatVector(v)
    }
}

impl<T: Into<PrimitiveValue>> From<Option<T>> for PrimitiveValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(PrimitiveValue::Nothing)
    }
}
