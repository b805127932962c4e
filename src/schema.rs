//! Schema entries

use serde::{Deserialize, Serialize};
use std::fmt;

/// One registered version of a subject: a store-assigned id and the schema text
///
/// Entries are immutable. Two entries are equal when both id and text match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaEntry {
    id: String,
    schema: String,
}

impl SchemaEntry {
    pub fn new(id: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            schema: schema.into(),
        }
    }

    /// Entry from a numeric store identifier
    pub fn from_store(id: i64, schema: impl Into<String>) -> Self {
        Self::new(id.to_string(), schema)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The id as a store key, if it is one
    pub fn store_id(&self) -> Option<i64> {
        self.id.parse().ok()
    }
}

impl fmt::Display for SchemaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.id, self.schema)
    }
}
