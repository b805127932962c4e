//! PostgreSQL engine tests
//!
//! Run only when `SCHEMA_STORE_TEST_POSTGRES_URL` points at a scratch
//! database. Subject names are randomized per run; schema text is too, so
//! the global schema table can be shared between runs.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use schema_store::store;
use schema_store::{BackendSettings, ErrorKind, SchemaStore, SubjectConfig};

async fn connect() -> Option<Arc<dyn SchemaStore>> {
    let url = std::env::var("SCHEMA_STORE_TEST_POSTGRES_URL").ok()?;
    Some(store::connect(&BackendSettings::new(url)).await.unwrap())
}

fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    format!("{}-{}", prefix, nanos)
}

#[tokio::test]
async fn test_register_and_dedup() {
    let Some(store) = connect().await else { return };
    let orders = unique("orders");
    let payments = unique("payments");
    let text = unique("schema");

    store.create_subject(&orders, &SubjectConfig::new()).await.unwrap();
    store.create_subject(&payments, &SubjectConfig::new()).await.unwrap();

    let a = store.register_schema(&orders, &text).await.unwrap();
    let again = store.register_schema(&orders, &text).await.unwrap();
    let b = store.register_schema(&payments, &text).await.unwrap();
    assert_eq!(a, again);
    assert_eq!(a.id(), b.id());
    assert_eq!(store.load_schemas(&orders).await.unwrap(), vec![a]);
}

#[tokio::test]
async fn test_attachment_order_and_guard() {
    let Some(store) = connect().await else { return };
    let subject = unique("ordered");
    store.create_subject(&subject, &SubjectConfig::new()).await.unwrap();

    let first = store.register_schema(&subject, &unique("a")).await.unwrap();
    let second = store.register_schema(&subject, &unique("b")).await.unwrap();

    let stale = store
        .register_schema_if_latest(&subject, &unique("c"), Some(&first))
        .await
        .unwrap();
    assert!(stale.is_none());

    let third = store
        .register_schema_if_latest(&subject, &unique("c"), Some(&second))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(store.load_schemas(&subject).await.unwrap(), vec![first, second, third]);
}

#[tokio::test]
async fn test_concurrent_registration_of_same_text() {
    let Some(store) = connect().await else { return };
    let text = unique("contended");
    let mut subjects = Vec::new();
    for i in 0..8 {
        let name = unique(&format!("contender{}", i));
        store.create_subject(&name, &SubjectConfig::new()).await.unwrap();
        subjects.push(name);
    }

    let mut tasks = Vec::new();
    for name in subjects {
        let store = store.clone();
        let text = text.clone();
        tasks.push(tokio::spawn(async move { store.register_schema(&name, &text).await }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap().id().to_string());
    }
    assert!(ids.iter().all(|id| id == &ids[0]));
}

#[tokio::test]
async fn test_concurrent_subject_creation() {
    let Some(store) = connect().await else { return };
    let name = unique("raced");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let name = name.clone();
        tasks.push(tokio::spawn(async move {
            store.create_subject(&name, &SubjectConfig::new()).await
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap().id);
    }
    assert!(ids.iter().all(|id| *id == ids[0]));
}

#[tokio::test]
async fn test_missing_subject() {
    let Some(store) = connect().await else { return };
    let err = store.load_subject(&unique("missing")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = store.register_schema(&unique("missing"), "x").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
