//! PostgreSQL engine
//!
//! Row locks carry the concurrency contract: registrations lock the subject
//! row and then the candidate hash row, so concurrent registrations of the
//! same content, or guarded registrations on the same subject, run one after
//! the other inside their transactions.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{debug, error, info};

use super::{bounded, latest_matches, Attachment, SchemaStore, SubjectRecord};
use crate::config::BackendSettings;
use crate::error::{Result, StoreError};
use crate::hash::ContentHash;
use crate::schema::SchemaEntry;
use crate::subject_config::SubjectConfig;

const MIGRATIONS: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS subjects (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        config TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS schemas (
        id BIGSERIAL PRIMARY KEY,
        definition TEXT NOT NULL,
        hash TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS subject_schemas (
        seq BIGSERIAL PRIMARY KEY,
        subject_id BIGINT NOT NULL REFERENCES subjects(id),
        schema_id BIGINT NOT NULL REFERENCES schemas(id),
        UNIQUE (subject_id, schema_id)
    )",
];

/// PostgreSQL-backed schema store
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub async fn connect(settings: &BackendSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.operation_timeout())
            .connect(&settings.url)
            .await?;

        info!(max_connections = settings.max_connections, "opened postgres schema store");
        Ok(Self::with_pool(pool, settings.operation_timeout()))
    }

    pub fn with_pool(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn lock_subject(tx: &mut Transaction<'_, Postgres>, subject: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT id FROM subjects WHERE name = $1 FOR UPDATE")
            .bind(subject)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| StoreError::subject_not_found(subject))
    }

    async fn latest_schema_id(tx: &mut Transaction<'_, Postgres>, subject_id: i64) -> Result<Option<i64>> {
        let id = sqlx::query_scalar(
            "SELECT schema_id FROM subject_schemas WHERE subject_id = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(subject_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(id)
    }

    async fn lock_schema_row(
        tx: &mut Transaction<'_, Postgres>,
        hash: &ContentHash,
    ) -> Result<Option<(i64, String)>> {
        let row = sqlx::query_as("SELECT id, definition FROM schemas WHERE hash = $1 FOR UPDATE")
            .bind(hash.as_str())
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row)
    }

    async fn dedup_and_attach(
        tx: &mut Transaction<'_, Postgres>,
        subject: &str,
        subject_id: i64,
        previous_latest: Option<i64>,
        schema: &str,
    ) -> Result<Attachment> {
        let hash = ContentHash::of(schema);

        let (schema_id, stored) = match Self::lock_schema_row(tx, &hash).await? {
            Some(row) => row,
            None => {
                let inserted: Option<i64> = sqlx::query_scalar(
                    "INSERT INTO schemas (definition, hash) VALUES ($1, $2)
                     ON CONFLICT (hash) DO NOTHING
                     RETURNING id",
                )
                .bind(schema)
                .bind(hash.as_str())
                .fetch_optional(&mut **tx)
                .await?;

                match inserted {
                    Some(id) => {
                        debug!(subject, %hash, schema_id = id, "stored new schema");
                        (id, schema.to_string())
                    }
                    // a concurrent registration committed the row first
                    None => Self::lock_schema_row(tx, &hash).await?.ok_or_else(|| {
                        StoreError::Unavailable(format!("schema row for hash {} is not visible", hash))
                    })?,
                }
            }
        };
        if stored != schema {
            error!(subject, %hash, schema_id, "hash collision with differing schema text");
            return Err(StoreError::Corruption {
                hash: hash.to_string(),
                schema_id,
            });
        }

        let attached = sqlx::query(
            "INSERT INTO subject_schemas (subject_id, schema_id) VALUES ($1, $2)
             ON CONFLICT (subject_id, schema_id) DO NOTHING",
        )
        .bind(subject_id)
        .bind(schema_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        debug!(subject, schema_id, new_version = attached > 0, "attached schema");
        Ok(Attachment {
            entry: SchemaEntry::from_store(schema_id, schema),
            new_version: attached > 0,
            previous_latest,
        })
    }

    async fn create_subject_tx(&self, subject: &str, config: &SubjectConfig) -> Result<SubjectRecord> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id, name, config FROM subjects WHERE name = $1 FOR UPDATE")
            .bind(subject)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(row) = existing {
            tx.commit().await?;
            return row_to_subject(&row);
        }

        // losers of a concurrent insert wait on the winner's row, then read it
        let inserted = sqlx::query(
            "INSERT INTO subjects (name, config) VALUES ($1, $2)
             ON CONFLICT (name) DO NOTHING
             RETURNING id, name, config",
        )
        .bind(subject)
        .bind(config.to_properties())
        .fetch_optional(&mut *tx)
        .await?;

        let record = match inserted {
            Some(row) => {
                info!(subject, "created subject");
                row_to_subject(&row)?
            }
            None => {
                let row = sqlx::query("SELECT id, name, config FROM subjects WHERE name = $1")
                    .bind(subject)
                    .fetch_one(&mut *tx)
                    .await?;
                row_to_subject(&row)?
            }
        };
        tx.commit().await?;
        Ok(record)
    }

    async fn load_subject_row(&self, subject: &str) -> Result<SubjectRecord> {
        let row = sqlx::query("SELECT id, name, config FROM subjects WHERE name = $1")
            .bind(subject)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::subject_not_found(subject))?;
        row_to_subject(&row)
    }

    async fn load_schema_rows(&self, subject: &str) -> Result<Vec<SchemaEntry>> {
        let record = self.load_subject_row(subject).await?;
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT s.id, s.definition
             FROM subject_schemas m
             JOIN schemas s ON s.id = m.schema_id
             WHERE m.subject_id = $1
             ORDER BY m.seq",
        )
        .bind(record.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, definition)| SchemaEntry::from_store(id, definition))
            .collect())
    }

    async fn register_tx(&self, subject: &str, schema: &str) -> Result<Attachment> {
        let mut tx = self.pool.begin().await?;
        let subject_id = Self::lock_subject(&mut tx, subject).await?;
        let previous = Self::latest_schema_id(&mut tx, subject_id).await?;
        let attachment = Self::dedup_and_attach(&mut tx, subject, subject_id, previous, schema).await?;
        tx.commit().await?;
        Ok(attachment)
    }

    async fn register_if_latest_tx(
        &self,
        subject: &str,
        schema: &str,
        expected: Option<&SchemaEntry>,
    ) -> Result<Option<Attachment>> {
        let mut tx = self.pool.begin().await?;
        let subject_id = Self::lock_subject(&mut tx, subject).await?;

        let current = Self::latest_schema_id(&mut tx, subject_id).await?;
        if !latest_matches(current, expected) {
            debug!(subject, ?current, "latest moved, not registering");
            return Ok(None);
        }

        let attachment = Self::dedup_and_attach(&mut tx, subject, subject_id, current, schema).await?;
        tx.commit().await?;
        Ok(Some(attachment))
    }
}

fn row_to_subject(row: &PgRow) -> Result<SubjectRecord> {
    let config: String = row.try_get("config")?;
    Ok(SubjectRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        config: SubjectConfig::from_properties(&config),
    })
}

#[async_trait]
impl SchemaStore for PgStore {
    async fn migrate(&self) -> Result<()> {
        bounded(self.timeout, "migrate", async {
            for statement in MIGRATIONS {
                sqlx::query(statement).execute(&self.pool).await?;
            }
            Ok(())
        })
        .await
    }

    async fn health_check(&self) -> Result<()> {
        bounded(self.timeout, "health_check", async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    async fn subject_exists(&self, subject: &str) -> Result<bool> {
        bounded(self.timeout, "subject_exists", async {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM subjects WHERE name = $1)")
                    .bind(subject)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        })
        .await
    }

    async fn create_subject(&self, subject: &str, config: &SubjectConfig) -> Result<SubjectRecord> {
        bounded(self.timeout, "create_subject", self.create_subject_tx(subject, config)).await
    }

    async fn load_subject(&self, subject: &str) -> Result<SubjectRecord> {
        bounded(self.timeout, "load_subject", self.load_subject_row(subject)).await
    }

    async fn load_subjects(&self) -> Result<Vec<SubjectRecord>> {
        bounded(self.timeout, "load_subjects", async {
            let rows = sqlx::query("SELECT id, name, config FROM subjects ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(row_to_subject).collect()
        })
        .await
    }

    async fn load_schemas(&self, subject: &str) -> Result<Vec<SchemaEntry>> {
        bounded(self.timeout, "load_schemas", self.load_schema_rows(subject)).await
    }

    async fn attach_schema(&self, subject: &str, schema: &str) -> Result<Attachment> {
        bounded(self.timeout, "attach_schema", self.register_tx(subject, schema)).await
    }

    async fn attach_schema_if_latest(
        &self,
        subject: &str,
        schema: &str,
        expected: Option<&SchemaEntry>,
    ) -> Result<Option<Attachment>> {
        bounded(
            self.timeout,
            "attach_schema_if_latest",
            self.register_if_latest_tx(subject, schema, expected),
        )
        .await
    }
}
