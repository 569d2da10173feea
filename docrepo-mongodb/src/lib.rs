//! MongoDB backend implementation for docrepo.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait over the
//! official async driver. Native filters, updates, projections and pipelines produced by the
//! repository are sent to the server as they are.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docrepo = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Sessions** - Every operation runs in the caller's `ClientSession` when one is supplied
//! - **Transactions** - `start_transaction`, `commit_transaction` and `abort_transaction` helpers
//! - **Streaming** - Cursors are forward-only streams, session cursors lock the session per advance
//! - **Indexing** - Ascending, descending, text and compound text indexes
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!     .with_app_name("orders")
//!     .build()
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_mongodb;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
