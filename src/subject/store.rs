//! Subject backed by the transactional store
//!
//! Writes always go to the store. Reads are answered from the version cache
//! and fall back to one reload from the store on a miss.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::Subject;
use crate::cache::VersionCache;
use crate::error::Result;
use crate::schema::SchemaEntry;
use crate::store::{Attachment, SchemaStore, SubjectRecord};
use crate::subject_config::SubjectConfig;
use crate::validator::{validate_schema_text, SchemaValidator};

pub struct StoreSubject {
    name: String,
    config: SubjectConfig,
    store: Arc<dyn SchemaStore>,
    validator: Arc<dyn SchemaValidator>,
    cache: RwLock<VersionCache>,
}

impl StoreSubject {
    /// Load an existing subject and its entries.
    ///
    /// Fails with `SubjectNotFound` if the store has no such subject.
    pub async fn open(
        store: Arc<dyn SchemaStore>,
        validator: Arc<dyn SchemaValidator>,
        name: &str,
    ) -> Result<Self> {
        let record = store.load_subject(name).await?;
        Self::from_record(store, validator, record).await
    }

    /// Build from a subject row already read from the store
    pub async fn from_record(
        store: Arc<dyn SchemaStore>,
        validator: Arc<dyn SchemaValidator>,
        record: SubjectRecord,
    ) -> Result<Self> {
        let entries = store.load_schemas(&record.name).await?;
        debug!(subject = %record.name, versions = entries.len(), "loaded subject");
        Ok(Self {
            name: record.name,
            config: record.config,
            store,
            validator,
            cache: RwLock::new(VersionCache::from_entries(entries)),
        })
    }

    /// Replace the cache with the store's current view
    async fn reload(&self) -> Result<()> {
        let entries = self.store.load_schemas(&self.name).await?;
        debug!(subject = %self.name, versions = entries.len(), "reloaded subject");
        self.cache.write().await.replace_all(entries);
        Ok(())
    }

    fn validate(&self, schema: &str) -> Result<()> {
        validate_schema_text(schema)?;
        self.validator.validate(schema)
    }

    /// Fold a committed attachment into the cache.
    ///
    /// The entry is appended only if the cache was at the store's latest
    /// when the attachment was made; otherwise another writer got in
    /// between and the cache is reloaded.
    async fn apply(&self, attachment: &Attachment) -> Result<()> {
        let in_step = {
            let mut cache = self.cache.write().await;
            let cached_latest = cache.latest().and_then(SchemaEntry::store_id);
            if cached_latest != attachment.previous_latest {
                false
            } else if attachment.new_version {
                cache.add(attachment.entry.clone())
            } else {
                cache.lookup_by_id(attachment.entry.id()).is_some()
            }
        };
        if !in_step {
            debug!(subject = %self.name, "cache behind the store, reloading");
            self.reload().await?;
        }
        Ok(())
    }
}

impl fmt::Debug for StoreSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSubject")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Subject for StoreSubject {
    fn name(&self) -> &str {
        &self.name
    }

    async fn config(&self) -> Result<SubjectConfig> {
        Ok(self.config.clone())
    }

    async fn register(&self, schema: &str) -> Result<SchemaEntry> {
        self.validate(schema)?;
        let attachment = self.store.attach_schema(&self.name, schema).await?;
        self.apply(&attachment).await?;
        Ok(attachment.entry)
    }

    async fn register_if_latest(
        &self,
        schema: &str,
        latest: Option<&SchemaEntry>,
    ) -> Result<Option<SchemaEntry>> {
        let current = self.cache.read().await.latest().cloned();
        if current.as_ref() != latest {
            debug!(subject = %self.name, "expected latest is stale, not registering");
            return Ok(None);
        }

        self.validate(schema)?;
        match self
            .store
            .attach_schema_if_latest(&self.name, schema, latest)
            .await?
        {
            Some(attachment) => {
                self.apply(&attachment).await?;
                Ok(Some(attachment.entry))
            }
            None => {
                warn!(subject = %self.name, "another writer advanced latest, reloading");
                self.reload().await?;
                Ok(None)
            }
        }
    }

    async fn lookup_by_schema(&self, schema: &str) -> Result<Option<SchemaEntry>> {
        if let Some(entry) = self.cache.read().await.lookup_by_schema(schema) {
            return Ok(Some(entry.clone()));
        }
        self.reload().await?;
        Ok(self.cache.read().await.lookup_by_schema(schema).cloned())
    }

    async fn lookup_by_id(&self, id: &str) -> Result<Option<SchemaEntry>> {
        if let Some(entry) = self.cache.read().await.lookup_by_id(id) {
            return Ok(Some(entry.clone()));
        }
        self.reload().await?;
        Ok(self.cache.read().await.lookup_by_id(id).cloned())
    }

    async fn latest(&self) -> Result<Option<SchemaEntry>> {
        Ok(self.cache.read().await.latest().cloned())
    }

    async fn all_entries(&self) -> Result<Vec<SchemaEntry>> {
        Ok(self.cache.read().await.entries().to_vec())
    }
}
