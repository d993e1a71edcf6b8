//! In-memory document store.
//!
//! Used by the test suite and local development. Mirrors the external store's
//! semantics: field-level updates, server-side timestamps (RFC 3339 strings),
//! and set-semantics array ops. The `offline` switch simulates a backend
//! outage for failure-injection tests.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{Document, DocumentStore, FieldOp, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, Document>>>,
    offline: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store outage: while offline, every operation fails with
    /// [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }

    fn server_timestamp() -> Value {
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    fn apply(document: &mut Document, field: String, op: FieldOp) {
        match op {
            FieldOp::Set(value) => {
                document.insert(field, value);
            }
            FieldOp::ServerTimestamp => {
                document.insert(field, Self::server_timestamp());
            }
            FieldOp::ArrayUnion(values) => {
                let entry = document
                    .entry(field)
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !entry.is_array() {
                    *entry = Value::Array(Vec::new());
                }
                if let Value::Array(items) = entry {
                    for value in values {
                        let value = Value::String(value);
                        if !items.contains(&value) {
                            items.push(value);
                        }
                    }
                }
            }
            FieldOp::ArrayRemove(values) => {
                if let Some(Value::Array(items)) = document.get_mut(&field) {
                    items.retain(|item| {
                        item.as_str()
                            .is_none_or(|s| !values.iter().any(|v| v == s))
                    });
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn set(
        &self,
        collection: &str,
        key: &str,
        fields: Vec<(String, FieldOp)>,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();
        let mut document = Document::new();
        for (field, op) in fields {
            Self::apply(&mut document, field, op);
        }
        documents.insert(key.to_string(), document);
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        key: &str,
        fields: Vec<(String, FieldOp)>,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(key))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            })?;
        for (field, op) in fields {
            Self::apply(document, field, op);
        }
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Document>, StoreError> {
        self.check_online()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.get(key))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set_op(value: Value) -> FieldOp {
        FieldOp::Set(value)
    }

    #[tokio::test]
    async fn update_on_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let result = store
            .update("users", "u1", vec![("email".into(), set_op(json!("a@b.com")))])
            .await;
        assert!(matches!(result, Err(ref err) if err.is_not_found()));
    }

    #[tokio::test]
    async fn array_union_is_idempotent() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        store.set("users", "u1", Vec::new()).await?;
        for _ in 0..2 {
            store
                .update(
                    "users",
                    "u1",
                    vec![("deviceTokens".into(), FieldOp::ArrayUnion(vec!["t1".into()]))],
                )
                .await?;
        }
        let document = store.get("users", "u1").await?.expect("document exists");
        assert_eq!(document["deviceTokens"], json!(["t1"]));
        Ok(())
    }

    #[tokio::test]
    async fn array_remove_of_absent_value_is_a_noop() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        store
            .set(
                "users",
                "u1",
                vec![("deviceTokens".into(), FieldOp::ArrayUnion(vec!["t1".into()]))],
            )
            .await?;
        store
            .update(
                "users",
                "u1",
                vec![("deviceTokens".into(), FieldOp::ArrayRemove(vec!["t2".into()]))],
            )
            .await?;
        let document = store.get("users", "u1").await?.expect("document exists");
        assert_eq!(document["deviceTokens"], json!(["t1"]));
        Ok(())
    }

    #[tokio::test]
    async fn server_timestamp_resolves_to_rfc3339() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        store
            .set("users", "u1", vec![("createdAt".into(), FieldOp::ServerTimestamp)])
            .await?;
        let document = store.get("users", "u1").await?.expect("document exists");
        let stamp = document["createdAt"].as_str().expect("string timestamp");
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let result = store.get("users", "u1").await;
        assert!(matches!(result, Err(StoreError::Unavailable)));
        store.set_offline(false);
        assert!(store.get("users", "u1").await.is_ok());
    }

    #[tokio::test]
    async fn set_overwrites_the_whole_document() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        store
            .set("users", "u1", vec![("firstName".into(), set_op(json!("A")))])
            .await?;
        store
            .set("users", "u1", vec![("lastName".into(), set_op(json!("B")))])
            .await?;
        let document = store.get("users", "u1").await?.expect("document exists");
        assert!(document.get("firstName").is_none());
        assert_eq!(document["lastName"], json!("B"));
        Ok(())
    }
}
