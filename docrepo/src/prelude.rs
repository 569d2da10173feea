//! Convenient re-exports of commonly used types from docrepo.
//!
//! ```ignore
//! use docrepo::prelude::*;
//! ```
//!
//! This provides access to:
//! - Document traits and the repository facades
//! - Store backends and builders
//! - Filters, updates, projections and groupings
//! - Per-call options, sessions and cancellation
//! - Error and pagination types

pub use docrepo_core::{
    backend::{DynStoreBackend, StoreBackend, StoreBackendBuilder},
    blocking::{BlockingCursor, BlockingRepository},
    cancel::CancellationToken,
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult},
    operations::DocumentCursor,
    options::{IndexOptions, Options},
    page::{Page, PageRequest},
    projection::{Grouping, Projection},
    query::{Criteria, Expr, Field, FieldOp, Filter, Hint, QueryOptions, Sort, SortDirection},
    repository::{ReadOnlyRepository, Repository},
    session::SessionHandle,
    update::{Update, UpdateDefinition},
};
