//! Storage backend abstraction for the repository.
//!
//! This module defines the traits that abstract over the document database client, allowing
//! the repository to run against MongoDB or against the in-memory interpreter of the same
//! native dialect.
//!
//! # Overview
//!
//! The [`StoreBackend`] trait is the upstream boundary of the repository: collection access
//! by physical name, native filters/updates/sorts/projections, bulk inserts, cursors, index
//! management and session handles. Everything arriving here is already translated into
//! native documents; backends never see typed predicates.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`DynStoreBackend`]: An object-safe mirror for runtime backend selection
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances

use async_trait::async_trait;
use bson::Document;
use futures::stream::BoxStream;
use std::{any::Any, fmt::Debug};

use crate::{
    error::DocumentStoreResult,
    options::{IndexOptions, Options},
    query::QueryOptions,
    session::SessionHandle,
    translate::NativeUpdate,
};

/// A forward-only stream of native documents.
pub type DocumentStream = BoxStream<'static, DocumentStoreResult<Document>>;

/// Per-call execution context handed to the backend.
#[derive(Debug, Clone, Copy)]
pub struct NativeContext<'a> {
    /// The caller's session, if the call runs inside one.
    pub session: Option<&'a SessionHandle>,
    /// Native query options (hint, comment, time limit).
    pub query: &'a QueryOptions,
}

impl<'a> NativeContext<'a> {
    pub fn new(session: Option<&'a SessionHandle>, query: &'a QueryOptions) -> Self {
        Self { session, query }
    }

    pub fn from_options(options: &'a Options) -> Self {
        Self::new(options.session.as_ref(), &options.query)
    }
}

/// A native find: filter plus optional sort, window and projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub filter: Document,
    pub sort: Option<Document>,
    pub skip: u64,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
}

impl FindSpec {
    pub fn new(filter: Document) -> Self {
        Self { filter, ..Self::default() }
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// Counts reported by an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents selected by the filter.
    pub matched: u64,
    /// Documents whose stored value actually changed.
    pub modified: u64,
}

/// Abstract interface for document database backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Consistency across calls is the database's concern, not the backend's.
///
/// # Error Handling
///
/// Driver failures are returned as [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend)
/// with the driver's message. A session created by another backend yields
/// [`DocumentStoreError::InvalidSession`](crate::error::DocumentStoreError::InvalidSession).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts documents into a collection, creating it on first write.
    ///
    /// Documents already inserted stay inserted when a later one fails.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<()>;

    /// Returns every document selected by `spec`.
    async fn find(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Opens a forward-only cursor over the documents selected by `spec`.
    ///
    /// The cursor holds its own reference to the session, if any, and releases the native
    /// cursor when dropped.
    async fn find_stream(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<DocumentStream>;

    /// Counts the documents matching `filter`, stopping at `limit` when given.
    async fn count(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<u64>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64>;

    /// Applies `update` to the first (or, when `multi`, every) matching document.
    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: NativeUpdate,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Deletes the first (or, when `multi`, every) matching document, returning the count.
    async fn delete(
        &self,
        collection: &str,
        filter: Document,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64>;

    /// Runs an aggregation pipeline.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Creates an index over `keys`, returning its name.
    ///
    /// Creating an index whose definition already exists succeeds.
    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<String>;

    /// Drops the index with the given name.
    async fn drop_index(
        &self,
        collection: &str,
        name: &str,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<()>;

    /// Lists the names of every index on a collection.
    async fn list_index_names(
        &self,
        collection: &str,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<String>>;

    /// Starts a session owned by the caller.
    async fn start_session(&self) -> DocumentStoreResult<SessionHandle>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<()> {
        <B as StoreBackend>::insert_many(*self, collection, documents, ctx).await
    }

    async fn find(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>> {
        <B as StoreBackend>::find(*self, collection, spec, ctx).await
    }

    async fn find_stream(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<DocumentStream> {
        <B as StoreBackend>::find_stream(*self, collection, spec, ctx).await
    }

    async fn count(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<u64>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64> {
        <B as StoreBackend>::count(*self, collection, filter, limit, ctx).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: NativeUpdate,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<UpdateOutcome> {
        <B as StoreBackend>::update(*self, collection, filter, update, multi, ctx).await
    }

    async fn delete(
        &self,
        collection: &str,
        filter: Document,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64> {
        <B as StoreBackend>::delete(*self, collection, filter, multi, ctx).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>> {
        <B as StoreBackend>::aggregate(*self, collection, pipeline, ctx).await
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<String> {
        <B as StoreBackend>::create_index(*self, collection, keys, options, ctx).await
    }

    async fn drop_index(
        &self,
        collection: &str,
        name: &str,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<()> {
        <B as StoreBackend>::drop_index(*self, collection, name, ctx).await
    }

    async fn list_index_names(
        &self,
        collection: &str,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<String>> {
        <B as StoreBackend>::list_index_names(*self, collection, ctx).await
    }

    async fn start_session(&self) -> DocumentStoreResult<SessionHandle> {
        <B as StoreBackend>::start_session(*self).await
    }
}

/// Object-safe mirror of [`StoreBackend`], implemented for every backend.
///
/// `Box<dyn DynStoreBackend>` implements [`StoreBackend`] itself, so a repository can be
/// built over a backend chosen at runtime.
#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<()>;
    async fn find(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>>;
    async fn find_stream(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<DocumentStream>;
    async fn count(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<u64>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64>;
    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: NativeUpdate,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<UpdateOutcome>;
    async fn delete(
        &self,
        collection: &str,
        filter: Document,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64>;
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>>;
    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<String>;
    async fn drop_index(
        &self,
        collection: &str,
        name: &str,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<()>;
    async fn list_index_names(
        &self,
        collection: &str,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<String>>;
    async fn start_session(&self) -> DocumentStoreResult<SessionHandle>;
    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<B: StoreBackend + 'static> DynStoreBackend for B {
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<()> {
        StoreBackend::insert_many(self, collection, documents, ctx).await
    }

    async fn find(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>> {
        StoreBackend::find(self, collection, spec, ctx).await
    }

    async fn find_stream(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<DocumentStream> {
        StoreBackend::find_stream(self, collection, spec, ctx).await
    }

    async fn count(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<u64>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64> {
        StoreBackend::count(self, collection, filter, limit, ctx).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: NativeUpdate,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<UpdateOutcome> {
        StoreBackend::update(self, collection, filter, update, multi, ctx).await
    }

    async fn delete(
        &self,
        collection: &str,
        filter: Document,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64> {
        StoreBackend::delete(self, collection, filter, multi, ctx).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>> {
        StoreBackend::aggregate(self, collection, pipeline, ctx).await
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<String> {
        StoreBackend::create_index(self, collection, keys, options, ctx).await
    }

    async fn drop_index(
        &self,
        collection: &str,
        name: &str,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<()> {
        StoreBackend::drop_index(self, collection, name, ctx).await
    }

    async fn list_index_names(
        &self,
        collection: &str,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<String>> {
        StoreBackend::list_index_names(self, collection, ctx).await
    }

    async fn start_session(&self) -> DocumentStoreResult<SessionHandle> {
        StoreBackend::start_session(self).await
    }

    async fn shutdown_boxed(self: Box<Self>) -> DocumentStoreResult<()> {
        StoreBackend::shutdown(*self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl StoreBackend for Box<dyn DynStoreBackend> {
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<()> {
        DynStoreBackend::insert_many(&**self, collection, documents, ctx).await
    }

    async fn find(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>> {
        DynStoreBackend::find(&**self, collection, spec, ctx).await
    }

    async fn find_stream(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<DocumentStream> {
        DynStoreBackend::find_stream(&**self, collection, spec, ctx).await
    }

    async fn count(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<u64>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64> {
        DynStoreBackend::count(&**self, collection, filter, limit, ctx).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: NativeUpdate,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<UpdateOutcome> {
        DynStoreBackend::update(&**self, collection, filter, update, multi, ctx).await
    }

    async fn delete(
        &self,
        collection: &str,
        filter: Document,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64> {
        DynStoreBackend::delete(&**self, collection, filter, multi, ctx).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>> {
        DynStoreBackend::aggregate(&**self, collection, pipeline, ctx).await
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<String> {
        DynStoreBackend::create_index(&**self, collection, keys, options, ctx).await
    }

    async fn drop_index(
        &self,
        collection: &str,
        name: &str,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<()> {
        DynStoreBackend::drop_index(&**self, collection, name, ctx).await
    }

    async fn list_index_names(
        &self,
        collection: &str,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<String>> {
        DynStoreBackend::list_index_names(&**self, collection, ctx).await
    }

    async fn start_session(&self) -> DocumentStoreResult<SessionHandle> {
        DynStoreBackend::start_session(&**self).await
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        DynStoreBackend::shutdown_boxed(self).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
