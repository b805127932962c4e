//! The per-subject contract consumed by the registry frontend
//!
//! Frontends depend only on [`Subject`]. The two backends are the variants of
//! [`SubjectHandle`]: [`StoreSubject`] over the transactional store and
//! [`ProxySubject`] forwarding to a remote registry.

mod store;

pub use store::StoreSubject;

use async_trait::async_trait;

use crate::error::Result;
use crate::proxy::ProxySubject;
use crate::schema::SchemaEntry;
use crate::subject_config::SubjectConfig;

/// A named, independently versioned stream of schemas
#[async_trait]
pub trait Subject: Send + Sync {
    fn name(&self) -> &str;

    /// Creation-time configuration
    async fn config(&self) -> Result<SubjectConfig>;

    /// Whether ids are store-assigned integers
    fn integral_keys(&self) -> bool {
        true
    }

    /// Register schema text, returning its entry.
    ///
    /// Registering text the subject already has returns the existing entry.
    async fn register(&self, schema: &str) -> Result<SchemaEntry>;

    /// Register only if `latest` is still the subject's latest entry.
    ///
    /// `Ok(None)` means the expectation was stale and nothing was written.
    async fn register_if_latest(
        &self,
        schema: &str,
        latest: Option<&SchemaEntry>,
    ) -> Result<Option<SchemaEntry>>;

    async fn lookup_by_schema(&self, schema: &str) -> Result<Option<SchemaEntry>>;

    async fn lookup_by_id(&self, id: &str) -> Result<Option<SchemaEntry>>;

    /// Most recently attached entry
    async fn latest(&self) -> Result<Option<SchemaEntry>>;

    /// Every entry, oldest first
    async fn all_entries(&self) -> Result<Vec<SchemaEntry>>;
}

/// A subject from either backend
#[derive(Debug)]
pub enum SubjectHandle {
    Store(StoreSubject),
    Proxy(ProxySubject),
}

impl SubjectHandle {
    fn inner(&self) -> &dyn Subject {
        match self {
            SubjectHandle::Store(subject) => subject,
            SubjectHandle::Proxy(subject) => subject,
        }
    }
}

#[async_trait]
impl Subject for SubjectHandle {
    fn name(&self) -> &str {
        self.inner().name()
    }

    async fn config(&self) -> Result<SubjectConfig> {
        self.inner().config().await
    }

    fn integral_keys(&self) -> bool {
        self.inner().integral_keys()
    }

    async fn register(&self, schema: &str) -> Result<SchemaEntry> {
        self.inner().register(schema).await
    }

    async fn register_if_latest(
        &self,
        schema: &str,
        latest: Option<&SchemaEntry>,
    ) -> Result<Option<SchemaEntry>> {
        self.inner().register_if_latest(schema, latest).await
    }

    async fn lookup_by_schema(&self, schema: &str) -> Result<Option<SchemaEntry>> {
        self.inner().lookup_by_schema(schema).await
    }

    async fn lookup_by_id(&self, id: &str) -> Result<Option<SchemaEntry>> {
        self.inner().lookup_by_id(id).await
    }

    async fn latest(&self) -> Result<Option<SchemaEntry>> {
        self.inner().latest().await
    }

    async fn all_entries(&self) -> Result<Vec<SchemaEntry>> {
        self.inner().all_entries().await
    }
}
