//! Transactional schema store
//!
//! Three tables back every engine:
//!
//! ```text
//! subjects         id, name (unique), config (key=value text)
//! schemas          id, definition, hash (unique)
//! subject_schemas  seq (attachment order), subject_id, schema_id, unique (subject_id, schema_id)
//! ```
//!
//! Schema rows are shared by every subject that attaches the same text, so
//! schema ids come from one global space. A subject's version history is its
//! membership rows ordered by `seq`.

mod postgres;
mod sqlite;

pub use postgres::PgStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BackendSettings;
use crate::error::{Result, StoreError};
use crate::schema::SchemaEntry;
use crate::subject_config::SubjectConfig;

/// A subject row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRecord {
    pub id: i64,
    pub name: String,
    pub config: SubjectConfig,
}

/// Result of attaching schema text to a subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub entry: SchemaEntry,
    /// Whether a membership row was written; false if the subject already had the text
    pub new_version: bool,
    /// The subject's latest schema id before this call, read under the subject lock
    pub previous_latest: Option<i64>,
}

/// Durable home for subjects and schema content.
///
/// Every mutating operation runs in a single transaction; a failed or
/// cancelled call leaves no partial rows behind.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Create the tables if they do not exist
    async fn migrate(&self) -> Result<()>;

    /// Check connectivity
    async fn health_check(&self) -> Result<()>;

    async fn subject_exists(&self, subject: &str) -> Result<bool>;

    /// Insert the subject if absent and return its row.
    ///
    /// Safe under concurrent callers: exactly one insert wins and every
    /// caller gets the same row back. An existing subject keeps its
    /// original config.
    async fn create_subject(&self, subject: &str, config: &SubjectConfig) -> Result<SubjectRecord>;

    /// Fails with `SubjectNotFound` if absent
    async fn load_subject(&self, subject: &str) -> Result<SubjectRecord>;

    /// Every subject, in creation order
    async fn load_subjects(&self) -> Result<Vec<SubjectRecord>>;

    /// Fails with `SubjectNotFound` if absent
    async fn load_subject_config(&self, subject: &str) -> Result<SubjectConfig> {
        Ok(self.load_subject(subject).await?.config)
    }

    /// All entries attached to the subject, in attachment order
    async fn load_schemas(&self, subject: &str) -> Result<Vec<SchemaEntry>>;

    /// Deduplicate `schema` into the global table and attach it to the subject.
    ///
    /// Attaching content the subject already has returns the existing entry
    /// and adds no version. A hash match with different stored text fails
    /// with `Corruption`.
    async fn attach_schema(&self, subject: &str, schema: &str) -> Result<Attachment>;

    /// [`SchemaStore::attach_schema`], but only if the subject's latest
    /// attached entry is still `expected` (`None`: the subject has no
    /// versions). The check and the attach share one transaction; on a
    /// mismatch nothing is written and `Ok(None)` is returned.
    async fn attach_schema_if_latest(
        &self,
        subject: &str,
        schema: &str,
        expected: Option<&SchemaEntry>,
    ) -> Result<Option<Attachment>>;

    async fn register_schema(&self, subject: &str, schema: &str) -> Result<SchemaEntry> {
        Ok(self.attach_schema(subject, schema).await?.entry)
    }

    async fn register_schema_if_latest(
        &self,
        subject: &str,
        schema: &str,
        expected: Option<&SchemaEntry>,
    ) -> Result<Option<SchemaEntry>> {
        Ok(self
            .attach_schema_if_latest(subject, schema, expected)
            .await?
            .map(|attachment| attachment.entry))
    }
}

/// Open the engine selected by the connection string and run its migrations
pub async fn connect(settings: &BackendSettings) -> Result<Arc<dyn SchemaStore>> {
    let url = settings.url.as_str();
    let store: Arc<dyn SchemaStore> = if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Arc::new(PgStore::connect(settings).await?)
    } else if url.starts_with("sqlite:") {
        Arc::new(SqliteStore::connect(settings).await?)
    } else {
        return Err(StoreError::InvalidConfig(format!(
            "unsupported store url: {}",
            url
        )));
    };
    store.migrate().await?;
    Ok(store)
}

/// Run a store call under a deadline.
///
/// On expiry the call's future is dropped, which rolls back any open
/// transaction.
pub(crate) async fn bounded<T, F>(limit: Duration, op: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(op, timeout_ms = limit.as_millis() as u64, "store call timed out");
            Err(StoreError::Unavailable(format!(
                "{} timed out after {:?}",
                op, limit
            )))
        }
    }
}

/// Whether the subject's current latest schema id satisfies `expected`
pub(crate) fn latest_matches(current: Option<i64>, expected: Option<&SchemaEntry>) -> bool {
    match (current, expected) {
        (None, None) => true,
        (Some(current), Some(expected)) => expected.store_id() == Some(current),
        _ => false,
    }
}
