//! Per-subject version cache
//!
//! A non-authoritative, never-evicting view of one subject's entries in
//! attachment order. The store is the source of truth; on any doubt the
//! owner reloads and calls [`VersionCache::replace_all`].

use std::collections::HashMap;

use crate::hash::ContentHash;
use crate::schema::SchemaEntry;

#[derive(Debug, Default)]
pub struct VersionCache {
    entries: Vec<SchemaEntry>,
    by_id: HashMap<String, usize>,
    by_hash: HashMap<ContentHash, usize>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<SchemaEntry>) -> Self {
        let mut cache = Self::new();
        cache.replace_all(entries);
        cache
    }

    /// Append an entry as the newest version.
    ///
    /// Returns false (and changes nothing) if an entry with the same id is
    /// already cached.
    pub fn add(&mut self, entry: SchemaEntry) -> bool {
        if self.by_id.contains_key(entry.id()) {
            return false;
        }
        let index = self.entries.len();
        self.by_id.insert(entry.id().to_string(), index);
        self.by_hash.insert(ContentHash::of(entry.schema()), index);
        self.entries.push(entry);
        true
    }

    /// Drop everything and load `entries` in the given order
    pub fn replace_all(&mut self, entries: Vec<SchemaEntry>) {
        self.entries.clear();
        self.by_id.clear();
        self.by_hash.clear();
        for entry in entries {
            self.add(entry);
        }
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<&SchemaEntry> {
        self.by_id.get(id).map(|&i| &self.entries[i])
    }

    pub fn lookup_by_schema(&self, schema: &str) -> Option<&SchemaEntry> {
        self.by_hash
            .get(&ContentHash::of(schema))
            .map(|&i| &self.entries[i])
            .filter(|entry| entry.schema() == schema)
    }

    /// Most recently attached entry
    pub fn latest(&self) -> Option<&SchemaEntry> {
        self.entries.last()
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
