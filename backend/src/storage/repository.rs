//! Typed access to the document store collections.
//!
//! A `Repository<T>` translates between a record type and raw documents: on
//! read it injects the document id into the record's id field, on write it
//! strips that field so the id never ends up duplicated in the body.

use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;

use super::traits::{Collection, Document, DocumentStore, StoreError};
use shared::{Expense, FinanceRecord, Saving, TodoItem};

/// A record type persisted in one collection
pub trait StoredRecord: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;
    /// Body field that receives the document id on read
    const ID_FIELD: &'static str;

    fn owner(&self) -> &str;
}

impl StoredRecord for FinanceRecord {
    const COLLECTION: Collection = Collection::Finances;
    const ID_FIELD: &'static str = "id";

    fn owner(&self) -> &str {
        self.user_id()
    }
}

impl StoredRecord for Expense {
    const COLLECTION: Collection = Collection::Expenses;
    const ID_FIELD: &'static str = "expenseId";

    fn owner(&self) -> &str {
        &self.user_id
    }
}

impl StoredRecord for Saving {
    const COLLECTION: Collection = Collection::Savings;
    const ID_FIELD: &'static str = "savingId";

    fn owner(&self) -> &str {
        &self.user_id
    }
}

impl StoredRecord for TodoItem {
    const COLLECTION: Collection = Collection::Todos;
    const ID_FIELD: &'static str = "id";

    fn owner(&self) -> &str {
        &self.user_id
    }
}

pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: StoredRecord> Repository<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// All records of the collection. Documents that do not decode are skipped.
    pub async fn list(&self) -> Result<Vec<T>> {
        let docs = self
            .store
            .list(T::COLLECTION)
            .await
            .with_context(|| format!("Failed to list {}", T::COLLECTION))?;

        Ok(docs.into_iter().filter_map(Self::decode).collect())
    }

    /// Records owned by one user, in store order
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<T>> {
        let records = self.list().await?;
        Ok(records.into_iter().filter(|r| r.owner() == user_id).collect())
    }

    /// The record stored under `id` if `user_id` owns it. A document owned by
    /// another user is reported as `StoreError::NotFound`, same as a missing one.
    pub async fn get_for_user(&self, user_id: &str, id: &str) -> Result<T> {
        let docs = self
            .store
            .list(T::COLLECTION)
            .await
            .with_context(|| format!("Failed to list {}", T::COLLECTION))?;

        docs.into_iter()
            .filter(|doc| doc.id == id)
            .filter_map(Self::decode)
            .find(|record| record.owner() == user_id)
            .ok_or_else(|| {
                anyhow!(StoreError::NotFound {
                    collection: T::COLLECTION,
                    id: id.to_string(),
                })
            })
    }

    /// Persist a new record and return its document id
    pub async fn create(&self, record: &T) -> Result<String> {
        let body = Self::body_of(record)?;
        self.store
            .create(T::COLLECTION, body)
            .await
            .with_context(|| format!("Failed to create {} document", T::COLLECTION))
    }

    /// Write every field of the record over the stored document
    pub async fn update(&self, id: &str, record: &T) -> Result<()> {
        let body = Self::body_of(record)?;
        self.update_fields(id, body).await
    }

    /// Merge selected top-level fields into the stored document
    pub async fn update_fields(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
        self.store
            .update(T::COLLECTION, id, fields)
            .await
            .with_context(|| format!("Failed to update {} document {}", T::COLLECTION, id))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store
            .delete(T::COLLECTION, id)
            .await
            .with_context(|| format!("Failed to delete {} document {}", T::COLLECTION, id))
    }

    fn decode(doc: Document) -> Option<T> {
        let mut data = doc.data;
        data.insert(T::ID_FIELD.to_string(), Value::String(doc.id.clone()));
        match serde_json::from_value::<T>(Value::Object(data)) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed {} document {}: {}", T::COLLECTION, doc.id, e);
                None
            }
        }
    }

    fn body_of(record: &T) -> Result<Map<String, Value>> {
        match serde_json::to_value(record)? {
            Value::Object(mut map) => {
                map.remove(T::ID_FIELD);
                Ok(map)
            }
            other => Err(anyhow!("{} record serialized to non-object {}", T::COLLECTION, other)),
        }
    }
}
