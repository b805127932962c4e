//! Directory over a mocked remote registry

use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schema_store::{
    Backend, BackendSettings, ErrorKind, OpaqueText, SchemaEntry, Subject, SubjectConfig,
    SubjectDirectory,
};

async fn directory(server: &MockServer, auto_create: bool) -> SubjectDirectory {
    let backend = Backend::connect(&BackendSettings::new(server.uri())).await.unwrap();
    assert!(matches!(backend, Backend::Remote(_)));
    SubjectDirectory::new(backend, Arc::new(OpaqueText), auto_create)
}

async fn subject_absent(server: &MockServer, subject: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/subjects/{}/versions/latest", subject)))
        .respond_with(ResponseTemplate::new(404).set_body_json(
            json!({"error_code": 40401, "message": "Subject not found"}),
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/config/{}", subject)))
        .respond_with(ResponseTemplate::new(404).set_body_json(
            json!({"error_code": 40401, "message": "Subject not found"}),
        ))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_create_with_empty_config_sets_default_compatibility() {
    let server = MockServer::start().await;
    subject_absent(&server, "orders").await;
    Mock::given(method("PUT"))
        .and(path("/config/orders"))
        .and(body_json(json!({"compatibility": "BACKWARD_TRANSITIVE"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"compatibility": "BACKWARD_TRANSITIVE"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = directory(&server, true).await;
    let subject = dir.register_subject("orders", &SubjectConfig::new()).await.unwrap();
    assert_eq!(subject.name(), "orders");
    assert!(subject.integral_keys());
}

#[tokio::test]
async fn test_create_with_config_sets_none() {
    let server = MockServer::start().await;
    subject_absent(&server, "payments").await;
    Mock::given(method("PUT"))
        .and(path("/config/payments"))
        .and(body_json(json!({"compatibility": "NONE"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"compatibility": "NONE"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = directory(&server, true).await;
    let config = SubjectConfig::with_validators(["syntax"]);
    dir.register_subject("payments", &config).await.unwrap();
}

#[tokio::test]
async fn test_existing_subject_is_not_reconfigured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subjects/orders/versions/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"subject": "orders", "version": 1, "id": 7, "schema": "\"int\""}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let dir = directory(&server, true).await;
    let subject = dir.get_or_create_subject("orders", &SubjectConfig::new()).await.unwrap();
    assert_eq!(subject.latest().await.unwrap(), Some(SchemaEntry::new("7", "\"int\"")));
}

#[tokio::test]
async fn test_missing_subject_without_auto_create() {
    let server = MockServer::start().await;
    subject_absent(&server, "orders").await;

    let dir = directory(&server, false).await;
    assert!(dir.lookup_subject("orders").await.unwrap().is_none());
    let err = dir
        .get_or_create_subject("orders", &SubjectConfig::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_subject_names_and_health() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subjects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["orders", "payments"])))
        .mount(&server)
        .await;

    let dir = directory(&server, true).await;
    assert_eq!(dir.preload().await.unwrap(), 0);
    assert_eq!(
        dir.subject_names().await.unwrap(),
        vec!["orders".to_string(), "payments".to_string()]
    );
    dir.backend().health_check().await.unwrap();
}

#[tokio::test]
async fn test_subject_names_are_path_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subjects/team%2Forders/versions/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"subject": "team/orders", "version": 1, "id": 2, "schema": "\"string\""}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let dir = directory(&server, false).await;
    assert!(dir.lookup_subject("team/orders").await.unwrap().is_some());
}

#[tokio::test]
async fn test_unreachable_registry_is_retryable() {
    // a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let url = format!("http://127.0.0.1:{}", port);
    let backend = Backend::connect(&BackendSettings::new(url)).await.unwrap();
    let err = backend.health_check().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    assert!(err.is_retryable());
}
