use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::client::{RemoteRegistry, DEFAULT_COMPATIBILITY};
use crate::error::Result;
use crate::schema::SchemaEntry;
use crate::subject::Subject;
use crate::subject_config::SubjectConfig;
use crate::validator::{validate_schema_text, SchemaValidator};

/// Subject whose state lives entirely in the remote registry
#[derive(Debug)]
pub struct ProxySubject {
    name: String,
    remote: Arc<RemoteRegistry>,
    validator: Arc<dyn SchemaValidator>,
}

impl ProxySubject {
    pub fn new(name: impl Into<String>, remote: Arc<RemoteRegistry>, validator: Arc<dyn SchemaValidator>) -> Self {
        Self {
            name: name.into(),
            remote,
            validator,
        }
    }

    fn validate(&self, schema: &str) -> Result<()> {
        validate_schema_text(schema)?;
        self.validator.validate(schema)
    }
}

#[async_trait]
impl Subject for ProxySubject {
    fn name(&self) -> &str {
        &self.name
    }

    /// `BACKWARD_TRANSITIVE` (or no subject-level level) is the empty config;
    /// anything else is a config with no validators
    async fn config(&self) -> Result<SubjectConfig> {
        match self.remote.compatibility(&self.name).await? {
            None => Ok(SubjectConfig::new()),
            Some(level) if level.eq_ignore_ascii_case(DEFAULT_COMPATIBILITY) => Ok(SubjectConfig::new()),
            Some(_) => Ok(SubjectConfig::with_validators(Vec::<String>::new())),
        }
    }

    async fn register(&self, schema: &str) -> Result<SchemaEntry> {
        self.validate(schema)?;
        let id = self.remote.register(&self.name, schema).await?;
        debug!(subject = %self.name, id, "registered schema remotely");
        Ok(SchemaEntry::from_store(id, schema))
    }

    async fn register_if_latest(
        &self,
        schema: &str,
        latest: Option<&SchemaEntry>,
    ) -> Result<Option<SchemaEntry>> {
        // the remote stores a canonical form of the text, so only ids are comparable
        let current = self.remote.latest(&self.name).await?;
        if current.as_ref().map(SchemaEntry::id) != latest.map(SchemaEntry::id) {
            debug!(subject = %self.name, "expected latest is stale, not registering");
            return Ok(None);
        }
        self.register(schema).await.map(Some)
    }

    /// Text that fails validation cannot be registered, so it is absent
    async fn lookup_by_schema(&self, schema: &str) -> Result<Option<SchemaEntry>> {
        if self.validate(schema).is_err() {
            return Ok(None);
        }
        let id = self.remote.lookup(&self.name, schema).await?;
        Ok(id.map(|id| SchemaEntry::from_store(id, schema)))
    }

    /// Resolves the global id, then checks the schema is attached to this subject
    async fn lookup_by_id(&self, id: &str) -> Result<Option<SchemaEntry>> {
        let Ok(id) = id.parse::<i64>() else {
            return Ok(None);
        };
        let Some(schema) = self.remote.schema_by_id(id).await? else {
            return Ok(None);
        };
        match self.remote.lookup(&self.name, &schema).await? {
            Some(found) if found == id => Ok(Some(SchemaEntry::from_store(id, schema))),
            _ => Ok(None),
        }
    }

    async fn latest(&self) -> Result<Option<SchemaEntry>> {
        self.remote.latest(&self.name).await
    }

    async fn all_entries(&self) -> Result<Vec<SchemaEntry>> {
        let mut entries = Vec::new();
        for version in self.remote.versions(&self.name).await? {
            if let Some(entry) = self.remote.version(&self.name, version).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendSettings;
    use crate::error::{ErrorKind, StoreError};
    use crate::validator::{AvroSyntax, OpaqueText};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn subject(server: &MockServer, validator: Arc<dyn SchemaValidator>) -> ProxySubject {
        let remote = RemoteRegistry::new(&BackendSettings::new(server.uri())).unwrap();
        ProxySubject::new("orders-value", Arc::new(remote), validator)
    }

    #[tokio::test]
    async fn test_register() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subjects/orders-value/versions"))
            .and(body_json(json!({"schema": "\"string\""})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 21})))
            .expect(1)
            .mount(&server)
            .await;

        let entry = subject(&server, Arc::new(AvroSyntax))
            .register("\"string\"")
            .await
            .unwrap();
        assert_eq!(entry, SchemaEntry::new("21", "\"string\""));
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_text_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
            .expect(0)
            .mount(&server)
            .await;

        let err = subject(&server, Arc::new(AvroSyntax))
            .register("{broken")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_incompatible_schema_is_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subjects/orders-value/versions"))
            .respond_with(ResponseTemplate::new(409).set_body_json(
                json!({"error_code": 409, "message": "Schema being registered is incompatible"}),
            ))
            .mount(&server)
            .await;

        let err = subject(&server, Arc::new(OpaqueText))
            .register("\"int\"")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSchema(ref m) if m.contains("incompatible")));
    }

    #[tokio::test]
    async fn test_server_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subjects/orders-value/versions/latest"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = subject(&server, Arc::new(OpaqueText)).latest().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_latest_queries_remote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subjects/orders-value/versions/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"subject": "orders-value", "version": 3, "id": 8, "schema": "\"long\""}),
            ))
            .expect(2)
            .mount(&server)
            .await;

        let subject = subject(&server, Arc::new(OpaqueText));
        let expected = Some(SchemaEntry::new("8", "\"long\""));
        assert_eq!(subject.latest().await.unwrap(), expected);
        assert_eq!(subject.latest().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_register_if_latest_stale() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subjects/orders-value/versions/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"subject": "orders-value", "version": 2, "id": 5, "schema": "\"int\""}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/subjects/orders-value/versions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 6})))
            .expect(1)
            .mount(&server)
            .await;

        let subject = subject(&server, Arc::new(OpaqueText));
        let stale = SchemaEntry::new("4", "\"string\"");
        assert!(subject.register_if_latest("\"long\"", Some(&stale)).await.unwrap().is_none());

        let current = SchemaEntry::new("5", "\"int\"");
        let entry = subject
            .register_if_latest("\"long\"", Some(&current))
            .await
            .unwrap();
        assert_eq!(entry, Some(SchemaEntry::new("6", "\"long\"")));
    }

    #[tokio::test]
    async fn test_register_if_latest_accepts_canonicalized_latest() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subjects/orders-value/versions"))
            .and(body_json(json!({"schema": "{\"type\": \"string\"}"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 6})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/subjects/orders-value/versions"))
            .and(body_json(json!({"schema": "\"long\""})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7})))
            .expect(1)
            .mount(&server)
            .await;
        // the remote hands back its canonical form of the registered text
        Mock::given(method("GET"))
            .and(path("/subjects/orders-value/versions/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"subject": "orders-value", "version": 1, "id": 6, "schema": "\"string\""}),
            ))
            .mount(&server)
            .await;

        let subject = subject(&server, Arc::new(AvroSyntax));
        let registered = subject.register(r#"{"type": "string"}"#).await.unwrap();
        assert_eq!(registered.id(), "6");

        let next = subject
            .register_if_latest("\"long\"", Some(&registered))
            .await
            .unwrap();
        assert_eq!(next, Some(SchemaEntry::new("7", "\"long\"")));
    }

    #[tokio::test]
    async fn test_lookup_by_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subjects/orders-value"))
            .and(body_json(json!({"schema": "\"int\""})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"subject": "orders-value", "version": 1, "id": 3, "schema": "\"int\""}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/subjects/orders-value"))
            .and(body_json(json!({"schema": "\"long\""})))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                json!({"error_code": 40403, "message": "Schema not found"}),
            ))
            .mount(&server)
            .await;

        let subject = subject(&server, Arc::new(OpaqueText));
        assert_eq!(
            subject.lookup_by_schema("\"int\"").await.unwrap(),
            Some(SchemaEntry::new("3", "\"int\""))
        );
        assert!(subject.lookup_by_schema("\"long\"").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_id_checks_membership() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schemas/ids/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"schema": "\"int\""})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/schemas/ids/9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"schema": "\"bytes\""})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/subjects/orders-value"))
            .and(body_json(json!({"schema": "\"int\""})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"subject": "orders-value", "version": 1, "id": 3, "schema": "\"int\""}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/subjects/orders-value"))
            .and(body_json(json!({"schema": "\"bytes\""})))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                json!({"error_code": 40403, "message": "Schema not found"}),
            ))
            .mount(&server)
            .await;

        let subject = subject(&server, Arc::new(OpaqueText));
        assert_eq!(
            subject.lookup_by_id("3").await.unwrap(),
            Some(SchemaEntry::new("3", "\"int\""))
        );
        // registered globally, but under another subject
        assert!(subject.lookup_by_id("9").await.unwrap().is_none());
        assert!(subject.lookup_by_id("not-a-number").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_all_entries_in_version_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subjects/orders-value/versions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/subjects/orders-value/versions/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"subject": "orders-value", "version": 1, "id": 10, "schema": "\"int\""}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/subjects/orders-value/versions/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"subject": "orders-value", "version": 2, "id": 4, "schema": "\"long\""}),
            ))
            .mount(&server)
            .await;

        let entries = subject(&server, Arc::new(OpaqueText)).all_entries().await.unwrap();
        assert_eq!(
            entries,
            vec![SchemaEntry::new("10", "\"int\""), SchemaEntry::new("4", "\"long\"")]
        );
    }

    #[tokio::test]
    async fn test_config_from_compatibility() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config/orders-value"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"compatibilityLevel": "NONE"})),
            )
            .mount(&server)
            .await;

        let config = subject(&server, Arc::new(OpaqueText)).config().await.unwrap();
        assert!(!config.is_empty());
        assert!(config.validators().is_empty());
    }

    #[tokio::test]
    async fn test_config_defaults_when_unset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config/orders-value"))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                json!({"error_code": 40401, "message": "Subject not found"}),
            ))
            .mount(&server)
            .await;

        let config = subject(&server, Arc::new(OpaqueText)).config().await.unwrap();
        assert!(config.is_empty());
    }
}
