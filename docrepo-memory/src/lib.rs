//! In-memory document storage backend for docrepo.
//!
//! This crate provides a thread-safe, in-process implementation of the `StoreBackend` trait.
//! It interprets the same native filter, update, projection, sort and aggregation documents
//! the MongoDB backend sends to the server, which makes it suitable for development and
//! testing of code written against the repository.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Native dialect** - Query, update and pipeline operators evaluated in process
//! - **Index registry** - Named indexes with uniqueness enforcement
//! - **Sessions** - Opaque session tokens bound to the store that issued them
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{Document, prelude::*};
//! use docrepo_memory::InMemoryStore;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Document)]
//! pub struct User {
//!     pub id: String,
//!     pub name: String,
//! }
//!
//! let repository = Repository::new(InMemoryStore::builder().build().await?);
//! repository.add_one(&User { id: "1".into(), name: "Alice".into() }, &Options::default()).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_memory;

mod aggregate;
mod evaluator;
mod projection;
mod update;
mod value;

pub mod store;

pub use store::{ID_INDEX_NAME, InMemorySession, InMemoryStore, InMemoryStoreBuilder};
