//! Subject directory
//!
//! Maps subject names to live [`SubjectHandle`]s. Each name resolves at most
//! once per directory: concurrent callers for an unseen name share a single
//! load-or-create and all observe the same instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{BackendSettings, Settings};
use crate::error::{Result, StoreError};
use crate::proxy::{ProxySubject, RemoteRegistry, DEFAULT_COMPATIBILITY, EXPLICIT_COMPATIBILITY};
use crate::store::{self, SchemaStore, SubjectRecord};
use crate::subject::{StoreSubject, SubjectHandle};
use crate::subject_config::SubjectConfig;
use crate::validator::{validate_subject_name, SchemaValidator};

/// Where subjects live
#[derive(Clone)]
pub enum Backend {
    /// Transactional store; this process assigns ids
    Store(Arc<dyn SchemaStore>),
    /// Remote registry; ids and ordering belong to the remote service
    Remote(Arc<RemoteRegistry>),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Store(_) => f.write_str("Backend::Store"),
            Backend::Remote(remote) => f.debug_tuple("Backend::Remote").field(remote).finish(),
        }
    }
}

impl Backend {
    /// Select the strategy from the URL scheme
    pub async fn connect(settings: &BackendSettings) -> Result<Self> {
        if settings.is_remote() {
            Ok(Backend::Remote(Arc::new(RemoteRegistry::new(settings)?)))
        } else {
            Ok(Backend::Store(store::connect(settings).await?))
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        match self {
            Backend::Store(store) => store.health_check().await,
            Backend::Remote(remote) => remote.health_check().await,
        }
    }

    /// A remote subject exists if it has a version or a subject-level config
    pub async fn subject_exists(&self, name: &str) -> Result<bool> {
        match self {
            Backend::Store(store) => store.subject_exists(name).await,
            Backend::Remote(remote) => {
                if remote.latest(name).await?.is_some() {
                    return Ok(true);
                }
                Ok(remote.compatibility(name).await?.is_some())
            }
        }
    }

    /// Create the subject if absent. An existing subject keeps its config.
    pub async fn create_subject(&self, name: &str, config: &SubjectConfig) -> Result<()> {
        match self {
            Backend::Store(store) => store.create_subject(name, config).await.map(|_| ()),
            Backend::Remote(remote) => {
                if self.subject_exists(name).await? {
                    return Ok(());
                }
                let level = if config.is_empty() {
                    DEFAULT_COMPATIBILITY
                } else {
                    EXPLICIT_COMPATIBILITY
                };
                remote.set_compatibility(name, level).await
            }
        }
    }

    /// Build a handle for a subject known to exist
    pub async fn open_subject(
        &self,
        name: &str,
        validator: Arc<dyn SchemaValidator>,
    ) -> Result<SubjectHandle> {
        match self {
            Backend::Store(store) => Ok(SubjectHandle::Store(
                StoreSubject::open(store.clone(), validator, name).await?,
            )),
            Backend::Remote(remote) => Ok(SubjectHandle::Proxy(ProxySubject::new(
                name,
                remote.clone(),
                validator,
            ))),
        }
    }

    pub async fn subject_names(&self) -> Result<Vec<String>> {
        match self {
            Backend::Store(store) => Ok(store
                .load_subjects()
                .await?
                .into_iter()
                .map(|record| record.name)
                .collect()),
            Backend::Remote(remote) => remote.subjects().await,
        }
    }
}

type Slot = Arc<OnceCell<Arc<SubjectHandle>>>;

/// Name-to-subject map over one backend
#[derive(Debug)]
pub struct SubjectDirectory {
    backend: Backend,
    validator: Arc<dyn SchemaValidator>,
    auto_create: bool,
    subjects: Mutex<HashMap<String, Slot>>,
}

impl SubjectDirectory {
    pub fn new(backend: Backend, validator: Arc<dyn SchemaValidator>, auto_create: bool) -> Self {
        Self {
            backend,
            validator,
            auto_create,
            subjects: Mutex::new(HashMap::new()),
        }
    }

    /// Connect the configured backend and, if enabled, preload its subjects
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let backend = Backend::connect(&settings.backend).await?;
        let directory = Self::new(
            backend,
            settings.directory.schema_format.validator(),
            settings.directory.auto_create_subjects,
        );
        if settings.directory.preload_subjects {
            directory.preload().await?;
        }
        Ok(directory)
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    fn slot(&self, name: &str) -> Result<Slot> {
        let mut subjects = self
            .subjects
            .lock()
            .map_err(|_| StoreError::Unavailable("subject directory lock poisoned".to_string()))?;
        Ok(subjects.entry(name.to_string()).or_default().clone())
    }

    /// Bulk-load every stored subject and its entries.
    ///
    /// Returns the number of subjects loaded. The remote backend holds no
    /// local state, so there is nothing to warm.
    pub async fn preload(&self) -> Result<usize> {
        let Backend::Store(store) = &self.backend else {
            debug!("remote backend, skipping preload");
            return Ok(0);
        };

        let records = store.load_subjects().await?;
        let count = records.len();
        for record in records {
            let name = record.name.clone();
            let slot = self.slot(&name)?;
            if slot.initialized() {
                continue;
            }
            let subject = self.handle_from_record(store, record).await?;
            // a concurrent caller may have resolved it meanwhile; keep theirs
            let _ = slot.set(Arc::new(subject));
        }
        info!(subjects = count, "preloaded subjects");
        Ok(count)
    }

    async fn handle_from_record(
        &self,
        store: &Arc<dyn SchemaStore>,
        record: SubjectRecord,
    ) -> Result<SubjectHandle> {
        Ok(SubjectHandle::Store(
            StoreSubject::from_record(store.clone(), self.validator.clone(), record).await?,
        ))
    }

    async fn open_or_create(
        &self,
        name: &str,
        create: Option<&SubjectConfig>,
    ) -> Result<Arc<SubjectHandle>> {
        match create {
            Some(config) => self.backend.create_subject(name, config).await?,
            None => {
                if !self.backend.subject_exists(name).await? {
                    return Err(StoreError::subject_not_found(name));
                }
            }
        }
        let subject = self.backend.open_subject(name, self.validator.clone()).await?;
        debug!(subject = name, "opened subject");
        Ok(Arc::new(subject))
    }

    /// Resolve `name` through its slot, creating it first when `create` is given
    async fn resolve(
        &self,
        name: &str,
        create: Option<&SubjectConfig>,
    ) -> Result<Option<Arc<SubjectHandle>>> {
        validate_subject_name(name)?;
        let slot = self.slot(name)?;
        let resolved = slot
            .get_or_try_init(|| self.open_or_create(name, create))
            .await;

        match resolved {
            Ok(subject) => Ok(Some(subject.clone())),
            Err(StoreError::SubjectNotFound { .. }) if create.is_none() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The subject if it exists; never creates
    pub async fn lookup_subject(&self, name: &str) -> Result<Option<Arc<SubjectHandle>>> {
        self.resolve(name, None).await
    }

    /// Create the subject if absent and return it. An existing subject keeps
    /// its original config.
    pub async fn register_subject(
        &self,
        name: &str,
        config: &SubjectConfig,
    ) -> Result<Arc<SubjectHandle>> {
        self.resolve(name, Some(config))
            .await?
            .ok_or_else(|| StoreError::subject_not_found(name))
    }

    /// The cached subject, or load it, creating it first when auto-create is
    /// enabled. Fails with `SubjectNotFound` if it is absent and may not be
    /// created.
    pub async fn get_or_create_subject(
        &self,
        name: &str,
        config: &SubjectConfig,
    ) -> Result<Arc<SubjectHandle>> {
        let create = self.auto_create.then_some(config);
        self.resolve(name, create)
            .await?
            .ok_or_else(|| StoreError::subject_not_found(name))
    }

    /// Every subject the backend knows, in creation order for the store
    pub async fn subject_names(&self) -> Result<Vec<String>> {
        self.backend.subject_names().await
    }
}
