//! Structural checks applied before any store interaction
//!
//! The store never parses schema text. Registration only requires that the
//! text passes the configured [`SchemaValidator`]; compatibility between
//! versions is decided elsewhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StoreError};

/// Delegated structural-validity check for schema text.
///
/// Callers reject empty text with [`validate_schema_text`] before
/// consulting a validator.
pub trait SchemaValidator: Send + Sync + fmt::Debug {
    fn validate(&self, schema: &str) -> Result<()>;
}

/// Accepts any text
#[derive(Debug, Default, Clone, Copy)]
pub struct OpaqueText;

impl SchemaValidator for OpaqueText {
    fn validate(&self, _schema: &str) -> Result<()> {
        Ok(())
    }
}

/// Requires the text to parse as an Avro schema
#[derive(Debug, Default, Clone, Copy)]
pub struct AvroSyntax;

impl SchemaValidator for AvroSyntax {
    fn validate(&self, schema: &str) -> Result<()> {
        apache_avro::Schema::parse_str(schema)
            .map(|_| ())
            .map_err(|e| StoreError::InvalidSchema(e.to_string()))
    }
}

/// Schema formats understood by the built-in validators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaFormat {
    #[default]
    Opaque,
    Avro,
}

impl SchemaFormat {
    pub fn validator(self) -> Arc<dyn SchemaValidator> {
        match self {
            SchemaFormat::Opaque => Arc::new(OpaqueText),
            SchemaFormat::Avro => Arc::new(AvroSyntax),
        }
    }
}

/// Reject empty schema text
pub fn validate_schema_text(schema: &str) -> Result<()> {
    if schema.is_empty() {
        return Err(StoreError::InvalidSchema("schema text is empty".to_string()));
    }
    Ok(())
}

/// Reject empty subject names and names with control characters
pub fn validate_subject_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidSubject("subject name is empty".to_string()));
    }
    if name.chars().any(char::is_control) {
        return Err(StoreError::InvalidSubject(format!(
            "subject name {:?} contains control characters",
            name
        )));
    }
    Ok(())
}
