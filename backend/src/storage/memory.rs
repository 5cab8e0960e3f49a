//! In-process document store, used for local runs and tests.

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{Collection, Document, DocumentStore, StoreError};

/// Document store backed by a map of insertion-ordered vectors
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<Collection, Vec<Document>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held in a collection
    pub async fn len(&self, collection: Collection) -> usize {
        let guard = self.collections.read().await;
        guard.get(&collection).map(Vec::len).unwrap_or(0)
    }

    /// Raw access to a single document
    pub async fn get(&self, collection: Collection, id: &str) -> Option<Document> {
        let guard = self.collections.read().await;
        guard
            .get(&collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id).cloned())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list(&self, collection: Collection) -> Result<Vec<Document>> {
        let guard = self.collections.read().await;
        Ok(guard.get(&collection).cloned().unwrap_or_default())
    }

    async fn create(&self, collection: Collection, data: Map<String, Value>) -> Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        debug!("memory store: create {}/{}", collection, id);

        let mut guard = self.collections.write().await;
        guard.entry(collection).or_default().push(Document { id: id.clone(), data });
        Ok(id)
    }

    async fn update(&self, collection: Collection, id: &str, data: Map<String, Value>) -> Result<()> {
        let mut guard = self.collections.write().await;
        let doc = guard
            .get_mut(&collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| StoreError::NotFound { collection, id: id.to_string() })?;

        for (key, value) in data {
            doc.data.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let mut guard = self.collections.write().await;
        if let Some(docs) = guard.get_mut(&collection) {
            docs.retain(|d| d.id != id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test body must be an object"),
        }
    }

    #[tokio::test]
    async fn test_create_list_preserves_insertion_order() {
        let store = MemoryStore::new();
        let a = store.create(Collection::Todos, body(json!({"title": "a"}))).await.unwrap();
        let b = store.create(Collection::Todos, body(json!({"title": "b"}))).await.unwrap();

        let docs = store.list(Collection::Todos).await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec![a, b]);
        assert!(store.list(Collection::Savings).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_top_level_fields() {
        let store = MemoryStore::new();
        let id = store
            .create(Collection::Expenses, body(json!({"expenseName": "Rent", "amount": 10})))
            .await
            .unwrap();

        store
            .update(Collection::Expenses, &id, body(json!({"amount": 20, "expenseId": id.clone()})))
            .await
            .unwrap();

        let doc = store.get(Collection::Expenses, &id).await.unwrap();
        assert_eq!(doc.data["expenseName"], json!("Rent"));
        assert_eq!(doc.data["amount"], json!(20));
        assert_eq!(doc.data["expenseId"], json!(id));
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(Collection::Savings, "nope", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        let id = store.create(Collection::Finances, Map::new()).await.unwrap();
        store.delete(Collection::Finances, &id).await.unwrap();
        store.delete(Collection::Finances, &id).await.unwrap();
        assert_eq!(store.len(Collection::Finances).await, 0);
    }
}
