//! A generic, partition-aware repository layer over document databases.
//!
//! This crate is the core of the docrepo project and provides:
//!
//! - **Document traits** ([`document`]) - The `Document` capability and native conversions
//! - **Collection resolution** ([`resolver`]) - Type plus partition key to physical collection
//! - **Filters, updates and projections** ([`query`], [`update`], [`projection`]) - Typed and native forms
//! - **Translation** ([`translate`]) - Typed forms to the native query dialect
//! - **Store backend abstraction** ([`backend`]) - Traits implemented by database backends
//! - **Operations** ([`operations`]) - Create, read, update, delete and index families
//! - **Repositories** ([`repository`], [`blocking`]) - Async, read-only and blocking facades
//! - **Per-call options** ([`options`], [`session`], [`cancel`]) - Partition, session, cancellation
//! - **Error handling** ([`error`]) - Error types and result types
//! - **Pagination** ([`page`]) - Page requests and result pages
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{Document, prelude::*};
//! use bson::Uuid;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Document)]
//! #[document(collection = "users")]
//! pub struct User {
//!     pub id: Uuid,
//!     #[document(partition_key)]
//!     pub tenant: String,
//!     pub name: String,
//! }
//!
//! let repository = Repository::new(InMemoryStore::new());
//! repository.add_one(&user, &Options::default()).await?;
//! let found = repository
//!     .get_by_id::<User>(&user.id, &Options::new().with_partition_key(&user.tenant))
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_core;

pub mod backend;
pub mod blocking;
pub mod cancel;
pub mod document;
pub mod error;
pub mod operations;
pub mod options;
pub mod page;
pub mod projection;
pub mod query;
pub mod repository;
pub mod resolver;
pub mod session;
pub mod translate;
pub mod update;
