//! # Storage Traits
//!
//! The document store abstraction used by the domain layer. Every collection is
//! a flat set of JSON documents keyed by a store-generated id; there are no
//! relations, queries or transactions, so filtering by user happens in the
//! services after a full fetch.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

/// The four independent collections held by the document store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Finances,
    Expenses,
    Savings,
    Todos,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Finances => "finances",
            Collection::Expenses => "expenses",
            Collection::Savings => "savings",
            Collection::Todos => "todos",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored document: its id plus the top-level fields of its body
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

/// Errors raised by document store implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document {id} not found in {collection}")]
    NotFound { collection: Collection, id: String },
    #[error("document store rejected the session; sign in again")]
    Unauthorized,
    #[error("document store returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("document store request failed: {0}")]
    Transport(String),
    #[error("could not decode document: {0}")]
    Codec(String),
}

impl StoreError {
    /// Whether `e`, or anything it wraps, is a `NotFound`
    pub fn is_not_found(e: &anyhow::Error) -> bool {
        e.chain()
            .any(|cause| matches!(cause.downcast_ref::<StoreError>(), Some(StoreError::NotFound { .. })))
    }
}

/// Trait defining the document store operations
///
/// Implementations are expected to be cheap to share behind an `Arc`; every
/// call is a single independent request with no retry.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch every document of a collection. No filtering or ordering is applied.
    async fn list(&self, collection: Collection) -> Result<Vec<Document>>;

    /// Create a document and return the id the store generated for it
    async fn create(&self, collection: Collection, data: Map<String, Value>) -> Result<String>;

    /// Merge the given top-level fields into an existing document.
    /// Fails with `StoreError::NotFound` when the document does not exist.
    async fn update(&self, collection: Collection, id: &str, data: Map<String, Value>) -> Result<()>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;
}
