use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::config::BackendSettings;
use crate::error::{Result, StoreError};
use crate::schema::SchemaEntry;

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Compatibility level stored by the remote registry for subjects whose
/// config is empty
pub const DEFAULT_COMPATIBILITY: &str = "BACKWARD_TRANSITIVE";

/// Compatibility level for subjects that carry their own config
pub const EXPLICIT_COMPATIBILITY: &str = "NONE";

#[derive(Debug, Serialize)]
struct SchemaRequest<'a> {
    schema: &'a str,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    schema: String,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    id: i64,
    schema: String,
}

#[derive(Debug, Serialize)]
struct CompatibilityRequest<'a> {
    compatibility: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompatibilityResponse {
    #[serde(rename = "compatibilityLevel")]
    compatibility_level: String,
}

/// HTTP client for a Confluent-compatible schema registry
///
/// Every remote failure is surfaced. A 404 becomes `Ok(None)` on lookups, a
/// 409 or 422 (incompatible or unparseable schema) becomes `InvalidSchema`,
/// anything else becomes a store-unavailable error.
#[derive(Debug, Clone)]
pub struct RemoteRegistry {
    base_url: Url,
    http: reqwest::Client,
}

impl RemoteRegistry {
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.operation_timeout_secs))
            .build()
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;

        let base_url = Url::parse(&settings.url)
            .map_err(|e| StoreError::InvalidConfig(format!("{}: {}", settings.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidConfig(format!(
                "{} cannot be used as a registry base url",
                settings.url
            )));
        }

        Ok(Self { base_url, http })
    }

    /// Append percent-encoded path segments to the base url
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Map non-success statuses onto the error taxonomy; 404 yields `None`
    async fn check(response: reqwest::Response) -> Result<Option<reqwest::Response>> {
        let status = response.status();
        if status.is_success() {
            return Ok(Some(response));
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(StoreError::InvalidSchema(body));
        }

        error!(status = status.as_u16(), %body, "remote registry error");
        Err(StoreError::Remote {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, segments: &[&str]) -> Result<Option<T>> {
        let response = self
            .http
            .get(self.endpoint(segments))
            .header(reqwest::header::ACCEPT, CONTENT_TYPE)
            .send()
            .await?;
        match Self::check(response).await? {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }

    async fn send_json<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        segments: &[&str],
        body: &B,
    ) -> Result<Option<T>> {
        let response = self
            .http
            .request(method, self.endpoint(segments))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(body)
            .send()
            .await?;
        match Self::check(response).await? {
            Some(response) => Ok(Some(response.json().await?)),
            None => Ok(None),
        }
    }

    /// Register schema text under a subject and return the remote id
    pub async fn register(&self, subject: &str, schema: &str) -> Result<i64> {
        debug!(subject, "registering schema remotely");
        let response: Option<IdResponse> = self
            .send_json(
                reqwest::Method::POST,
                &["subjects", subject, "versions"],
                &SchemaRequest { schema },
            )
            .await?;
        response
            .map(|r| r.id)
            .ok_or_else(|| StoreError::subject_not_found(subject))
    }

    /// Id of `schema` under `subject`, if registered there
    pub async fn lookup(&self, subject: &str, schema: &str) -> Result<Option<i64>> {
        let response: Option<IdResponse> = self
            .send_json(reqwest::Method::POST, &["subjects", subject], &SchemaRequest { schema })
            .await?;
        Ok(response.map(|r| r.id))
    }

    /// Schema text for a global id
    pub async fn schema_by_id(&self, id: i64) -> Result<Option<String>> {
        let response: Option<SchemaResponse> =
            self.get_json(&["schemas", "ids", &id.to_string()]).await?;
        Ok(response.map(|r| r.schema))
    }

    pub async fn latest(&self, subject: &str) -> Result<Option<SchemaEntry>> {
        let response: Option<VersionResponse> = self
            .get_json(&["subjects", subject, "versions", "latest"])
            .await?;
        Ok(response.map(|r| SchemaEntry::from_store(r.id, r.schema)))
    }

    /// Version numbers of a subject; empty if the subject is unknown
    pub async fn versions(&self, subject: &str) -> Result<Vec<i64>> {
        let versions: Option<Vec<i64>> = self
            .get_json(&["subjects", subject, "versions"])
            .await?;
        Ok(versions.unwrap_or_default())
    }

    pub async fn version(&self, subject: &str, version: i64) -> Result<Option<SchemaEntry>> {
        let response: Option<VersionResponse> = self
            .get_json(&["subjects", subject, "versions", &version.to_string()])
            .await?;
        Ok(response.map(|r| SchemaEntry::from_store(r.id, r.schema)))
    }

    /// Subject-level compatibility level, if one is set
    pub async fn compatibility(&self, subject: &str) -> Result<Option<String>> {
        let response: Option<CompatibilityResponse> =
            self.get_json(&["config", subject]).await?;
        Ok(response.map(|r| r.compatibility_level))
    }

    pub async fn set_compatibility(&self, subject: &str, level: &str) -> Result<()> {
        debug!(subject, level, "setting remote compatibility");
        let _: Option<serde_json::Value> = self
            .send_json(
                reqwest::Method::PUT,
                &["config", subject],
                &CompatibilityRequest { compatibility: level },
            )
            .await?;
        Ok(())
    }

    pub async fn subjects(&self) -> Result<Vec<String>> {
        let subjects: Option<Vec<String>> = self.get_json(&["subjects"]).await?;
        Ok(subjects.unwrap_or_default())
    }

    pub async fn health_check(&self) -> Result<()> {
        self.subjects().await.map(|_| ())
    }
}
