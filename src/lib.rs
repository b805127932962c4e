//! Schema Store
//!
//! Storage backend for a schema registry. Schemas are grouped into
//! subjects, each an independently versioned stream of schema text.
//!
//! ## Features
//!
//! - **Content Deduplication**: Identical schema text gets one global id, shared by every subject that registers it
//! - **Append-Only Versions**: A subject's history is its attachment order; latest is the last attached entry
//! - **Corruption Detection**: A SHA-256 hash match with different stored text aborts the registration
//! - **Optimistic Guard**: `register_if_latest` writes only if the caller's view of latest is current, checked inside the store transaction
//! - **Two Backends**: A transactional SQL store (Postgres or SQLite) or a pass-through proxy to a remote registry
//!
//! ## Architecture
//!
//! ```text
//! SubjectDirectory ── name → SubjectHandle
//!                              ├── StoreSubject ── VersionCache
//!                              │        └── SchemaStore (PgStore | SqliteStore)
//!                              └── ProxySubject ── RemoteRegistry (REST)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use schema_store::{Settings, Subject, SubjectConfig, SubjectDirectory};
//!
//! # async fn run() -> schema_store::Result<()> {
//! let directory = SubjectDirectory::from_settings(&Settings::load()?).await?;
//! let orders = directory.get_or_create_subject("orders-value", &SubjectConfig::new()).await?;
//! let entry = orders.register(r#"{"type": "string"}"#).await?;
//! assert_eq!(orders.latest().await?, Some(entry));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod hash;
pub mod proxy;
pub mod schema;
pub mod store;
pub mod subject;
pub mod subject_config;
pub mod validator;

pub use cache::VersionCache;
pub use config::{BackendSettings, DirectorySettings, Settings};
pub use directory::{Backend, SubjectDirectory};
pub use error::{ErrorKind, Result, StoreError};
pub use hash::ContentHash;
pub use proxy::{ProxySubject, RemoteRegistry};
pub use schema::SchemaEntry;
pub use store::{Attachment, PgStore, SchemaStore, SqliteStore, SubjectRecord};
pub use subject::{StoreSubject, Subject, SubjectHandle};
pub use subject_config::SubjectConfig;
pub use validator::{AvroSyntax, OpaqueText, SchemaFormat, SchemaValidator};
