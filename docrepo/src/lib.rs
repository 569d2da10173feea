//! Main docrepo crate providing a partition-aware repository over document databases.
//!
//! This crate is the primary entry point for users of docrepo. It re-exports the core types
//! from the sub-crates, the `Document` derive, and the storage backends.
//!
//! # Features
//!
//! - **Typed documents** - Define documents with Serde and `#[derive(Document)]`
//! - **Partitioned collections** - A partition key selects a physical collection per tenant
//! - **Typed or native queries** - Composable filters, updates and projections, or raw documents
//! - **Backends** - In-memory interpreter and MongoDB (behind the `mongodb` feature)
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{Document, prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Document)]
//! pub struct Invoice {
//!     pub id: String,
//!     #[document(partition_key)]
//!     pub tenant: String,
//!     pub total: i64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let repository = Repository::new(InMemoryStore::builder().build().await?);
//!     let invoice = Invoice { id: "inv-1".into(), tenant: "acme".into(), total: 120 };
//!
//!     // Stored in the "acme-invoices" collection.
//!     repository.add_one(&invoice, &Options::default()).await?;
//!
//!     let large = repository
//!         .get_all::<Invoice>(Filter::gt("total", 100), &Options::new().with_partition_key("acme"))
//!         .await?;
//!     assert_eq!(large.len(), 1);
//!
//!     repository.shutdown().await
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! Backends can be chosen at runtime by boxing them as `Box<dyn DynStoreBackend>`, which
//! itself implements `StoreBackend`:
//!
//! ```ignore
//! let backend: Box<dyn DynStoreBackend> = Box::new(InMemoryStore::new());
//! let repository = Repository::new(backend);
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process interpreter of the native dialect for development and testing
//! - `mongodb` - MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use docrepo_core::{
    backend, blocking, cancel, document, error, operations, options, page, projection, query, repository,
    resolver, session, translate, update,
};
pub use docrepo_macros::Document;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docrepo_memory::{ID_INDEX_NAME, InMemorySession, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docrepo_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
