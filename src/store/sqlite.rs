//! SQLite engine
//!
//! Single-node engine for embedded deployments and tests. The pool holds one
//! connection, so transactions in a process run one at a time. Write
//! transactions open with a write statement to take the database write lock
//! before reading, which serializes writers across processes too.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite, Transaction};
use std::str::FromStr;
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
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        config TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS schemas (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        definition TEXT NOT NULL,
        hash TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS subject_schemas (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        subject_id INTEGER NOT NULL REFERENCES subjects(id),
        schema_id INTEGER NOT NULL REFERENCES schemas(id),
        UNIQUE (subject_id, schema_id)
    )",
];

/// SQLite-backed schema store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    timeout: Duration,
}

impl SqliteStore {
    /// Open the database named by `settings.url` (`sqlite://path` or `sqlite::memory:`)
    pub async fn connect(settings: &BackendSettings) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(&settings.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            // lock waits outlast the call deadline, so a blocked call ends as Unavailable
            .busy_timeout(settings.operation_timeout() * 2);

        // an in-memory database lives only as long as its connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(settings.operation_timeout())
            .connect_with(opts)
            .await?;

        info!(url = %settings.url, "opened sqlite schema store");
        Ok(Self {
            pool,
            timeout: settings.operation_timeout(),
        })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Lock the database for writing and resolve the subject id
    async fn lock_subject(tx: &mut Transaction<'_, Sqlite>, subject: &str) -> Result<i64> {
        sqlx::query_scalar("UPDATE subjects SET name = name WHERE name = ? RETURNING id")
            .bind(subject)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| StoreError::subject_not_found(subject))
    }

    async fn latest_schema_id(tx: &mut Transaction<'_, Sqlite>, subject_id: i64) -> Result<Option<i64>> {
        let id = sqlx::query_scalar(
            "SELECT schema_id FROM subject_schemas WHERE subject_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(subject_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(id)
    }

    /// Dedup the text into `schemas` and attach it, inside the caller's locked transaction
    async fn dedup_and_attach(
        tx: &mut Transaction<'_, Sqlite>,
        subject: &str,
        subject_id: i64,
        previous_latest: Option<i64>,
        schema: &str,
    ) -> Result<Attachment> {
        let hash = ContentHash::of(schema);

        let existing: Option<(i64, String)> =
            sqlx::query_as("SELECT id, definition FROM schemas WHERE hash = ?")
                .bind(hash.as_str())
                .fetch_optional(&mut **tx)
                .await?;

        let schema_id = match existing {
            Some((id, stored)) => {
                if stored != schema {
                    error!(subject, %hash, schema_id = id, "hash collision with differing schema text");
                    return Err(StoreError::Corruption {
                        hash: hash.to_string(),
                        schema_id: id,
                    });
                }
                id
            }
            None => {
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO schemas (definition, hash) VALUES (?, ?) RETURNING id",
                )
                .bind(schema)
                .bind(hash.as_str())
                .fetch_one(&mut **tx)
                .await?;
                debug!(subject, %hash, schema_id = id, "stored new schema");
                id
            }
        };

        let attached = sqlx::query(
            "INSERT INTO subject_schemas (subject_id, schema_id) VALUES (?, ?)
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

        let inserted = sqlx::query(
            "INSERT INTO subjects (name, config) VALUES (?, ?) ON CONFLICT (name) DO NOTHING",
        )
        .bind(subject)
        .bind(config.to_properties())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let row = sqlx::query("SELECT id, name, config FROM subjects WHERE name = ?")
            .bind(subject)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        if inserted > 0 {
            info!(subject, "created subject");
        }
        row_to_subject(&row)
    }

    async fn load_subject_row(&self, subject: &str) -> Result<SubjectRecord> {
        sqlx::query("SELECT id, name, config FROM subjects WHERE name = ?")
            .bind(subject)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::subject_not_found(subject))
            .and_then(|row| row_to_subject(&row))
    }

    async fn load_schema_rows(&self, subject: &str) -> Result<Vec<SchemaEntry>> {
        let record = self.load_subject_row(subject).await?;
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT s.id, s.definition
             FROM subject_schemas m
             JOIN schemas s ON s.id = m.schema_id
             WHERE m.subject_id = ?
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

fn row_to_subject(row: &sqlx::sqlite::SqliteRow) -> Result<SubjectRecord> {
    let config: String = row.try_get("config")?;
    Ok(SubjectRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        config: SubjectConfig::from_properties(&config),
    })
}

#[async_trait]
impl SchemaStore for SqliteStore {
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
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM subjects WHERE name = ?)")
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
