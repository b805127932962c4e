//! Runtime settings for the schema store
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-store.toml)
//! - Environment variables (SCHEMA_STORE__*)
//!
//! ## Example config file (schema-store.toml):
//! ```toml
//! [backend]
//! url = "postgres://registry@localhost/schemas"
//! max_connections = 8
//! operation_timeout_secs = 30
//!
//! [directory]
//! auto_create_subjects = true
//! preload_subjects = true
//! schema_format = "avro"
//! ```
//!
//! The backend URL picks the strategy: `postgres://`, `postgresql://` and
//! `sqlite:` open the transactional store, `http://` and `https://` proxy to a
//! remote registry.

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;
use crate::validator::SchemaFormat;

/// Main settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub directory: DirectorySettings,
}

/// Where schemas live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Store connection string or remote registry URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Pool size for the Postgres engine (SQLite always uses one connection)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Deadline for each store or remote call
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

/// Subject directory behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySettings {
    /// Create unknown subjects on first use
    #[serde(default = "default_true")]
    pub auto_create_subjects: bool,

    /// Load every subject before serving
    #[serde(default = "default_true")]
    pub preload_subjects: bool,

    /// Structural check applied to schema text on registration
    #[serde(default)]
    pub schema_format: SchemaFormat,
}

fn default_url() -> String {
    "sqlite://schema-store.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    8
}

fn default_operation_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
            operation_timeout_secs: default_operation_timeout_secs(),
        }
    }
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            auto_create_subjects: true,
            preload_subjects: true,
            schema_format: SchemaFormat::default(),
        }
    }
}

impl BackendSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Whether the URL names a remote registry rather than a database
    pub fn is_remote(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }
}

impl Settings {
    /// Load settings from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        for location in ["schema-store.toml", "config/schema-store.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("org", "schemarepo", "schema-store") {
            let xdg_config = dirs.config_dir().join("schema-store.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_STORE")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }
}
