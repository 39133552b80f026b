//! Shared types used across the schema model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of an SDF field.
///
/// Parsed case-insensitively from the schema's `type` string. Unrecognised
/// names are kept in [`FieldType::Other`] and treated as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    #[default]
    String,
    Text,
    Email,
    Integer,
    Number,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Reference,
    Json,
    Other(String),
}

impl FieldType {
    /// Whole-number type.
    pub fn is_integer(&self) -> bool {
        matches!(self, FieldType::Integer)
    }

    /// Any numeric type (integer or fractional).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Number | FieldType::Decimal
        )
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, FieldType::Boolean)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Reference)
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Reference => "reference",
            FieldType::Json => "json",
            FieldType::Other(name) => name,
        }
    }
}

impl From<String> for FieldType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "string" | "uuid" => FieldType::String,
            "text" | "textarea" => FieldType::Text,
            "email" => FieldType::Email,
            "integer" | "int" => FieldType::Integer,
            "number" | "float" => FieldType::Number,
            "decimal" | "currency" => FieldType::Decimal,
            "boolean" | "bool" => FieldType::Boolean,
            "date" => FieldType::Date,
            "datetime" | "date_time" | "timestamp" => FieldType::DateTime,
            "reference" | "ref" => FieldType::Reference,
            "json" | "object" => FieldType::Json,
            other => FieldType::Other(other.to_string()),
        }
    }
}

impl From<FieldType> for String {
    fn from(ty: FieldType) -> Self {
        ty.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
