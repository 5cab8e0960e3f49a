//! # Storage Module
//!
//! Persistence for the four record collections. The domain layer only sees the
//! `DocumentStore` trait and the typed `Repository<T>` wrapper; concrete stores
//! are an in-memory map and the hosted Firestore database.

pub mod firestore;
pub mod memory;
pub mod repository;
pub mod traits;

pub use firestore::{FirestoreStore, IdTokenSource};
pub use memory::MemoryStore;
pub use repository::{Repository, StoredRecord};
pub use traits::{Collection, Document, DocumentStore, StoreError};
