//! Client-facing repository facades.
//!
//! A repository owns a backend and exposes every data-access operation, generic per call over
//! the document type; the key type is inferred from the document. Facades forward their
//! arguments unchanged: no batching, retries or caching happen here.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::prelude::*;
//!
//! let repository = Repository::new(InMemoryStore::new());
//!
//! repository.add_one(&order, &Options::default()).await?;
//! let pending: u64 = repository
//!     .count::<Order>(Filter::eq("Status", "pending"), &Options::default())
//!     .await?;
//! ```

use bson::Bson;
use serde::de::DeserializeOwned;
use std::ops::Deref;

use crate::{
    backend::StoreBackend,
    document::Document,
    error::DocumentStoreResult,
    operations::{DocumentCursor, OperationContext},
    options::{IndexOptions, Options},
    page::{Page, PageRequest},
    projection::{Grouping, Projection},
    query::Criteria,
    session::SessionHandle,
    update::Update,
};

/// A repository exposing only read operations.
#[derive(Debug)]
pub struct ReadOnlyRepository<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> ReadOnlyRepository<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    fn context(&self) -> OperationContext<'_, B> {
        OperationContext::new(&self.backend)
    }

    /// Starts a session on the backend. The caller owns the returned handle.
    pub async fn start_session(&self) -> DocumentStoreResult<SessionHandle> {
        self.backend.start_session().await
    }

    pub async fn get_by_id<D: Document>(&self, id: &D::Key, options: &Options) -> DocumentStoreResult<Option<D>> {
        self.context().read().get_by_id::<D>(id, options).await
    }

    pub async fn get_one<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        options: &Options,
    ) -> DocumentStoreResult<Option<D>> {
        self.context().read().get_one::<D>(criteria, options).await
    }

    pub async fn get_all<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<Vec<D>> {
        self.context().read().get_all::<D>(criteria, options).await
    }

    pub async fn any<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<bool> {
        self.context().read().any::<D>(criteria, options).await
    }

    pub async fn count<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<u64> {
        self.context().read().count::<D>(criteria, options).await
    }

    pub async fn get_by_min<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<D>> {
        self.context().read().get_by_min::<D>(criteria, field, options).await
    }

    pub async fn get_by_max<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<D>> {
        self.context().read().get_by_max::<D>(criteria, field, options).await
    }

    pub async fn get_min_value<D: Document, V: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<V>> {
        self.context()
            .read()
            .get_min_value::<D, V>(criteria, field, options)
            .await
    }

    pub async fn get_max_value<D: Document, V: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<V>> {
        self.context()
            .read()
            .get_max_value::<D, V>(criteria, field, options)
            .await
    }

    pub async fn get_cursor<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        options: &Options,
    ) -> DocumentStoreResult<DocumentCursor<D>> {
        self.context().read().get_cursor::<D>(criteria, options).await
    }

    pub async fn get_sorted_paginated<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        request: &PageRequest,
        options: &Options,
    ) -> DocumentStoreResult<Vec<D>> {
        self.context()
            .read()
            .get_sorted_paginated::<D>(criteria, request, options)
            .await
    }

    pub async fn get_paginated<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        request: &PageRequest,
        options: &Options,
    ) -> DocumentStoreResult<Page<D>> {
        self.context()
            .read()
            .get_paginated::<D>(criteria, request, options)
            .await
    }

    pub async fn group_by<D: Document, R: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        grouping: &Grouping,
        options: &Options,
    ) -> DocumentStoreResult<Vec<R>> {
        self.context()
            .read()
            .group_by::<D, R>(criteria, grouping, options)
            .await
    }

    pub async fn project_one<D: Document, P: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        projection: &Projection,
        options: &Options,
    ) -> DocumentStoreResult<Option<P>> {
        self.context()
            .read()
            .project_one::<D, P>(criteria, projection, options)
            .await
    }

    pub async fn project_many<D: Document, P: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        projection: &Projection,
        options: &Options,
    ) -> DocumentStoreResult<Vec<P>> {
        self.context()
            .read()
            .project_many::<D, P>(criteria, projection, options)
            .await
    }

    pub async fn sum_by<D: Document, T: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<T> {
        self.context()
            .read()
            .sum_by::<D, T>(criteria, field, options)
            .await
    }

    pub async fn get_index_names<D: Document>(&self, options: &Options) -> DocumentStoreResult<Vec<String>> {
        self.context().index().get_index_names::<D>(options).await
    }
}

/// A read/write repository. Read operations come from [`ReadOnlyRepository`] through `Deref`.
#[derive(Debug)]
pub struct Repository<B: StoreBackend> {
    inner: ReadOnlyRepository<B>,
}

impl<B: StoreBackend> Repository<B> {
    pub fn new(backend: B) -> Self {
        Self { inner: ReadOnlyRepository::new(backend) }
    }

    /// The read-only view of this repository.
    pub fn read_only(&self) -> &ReadOnlyRepository<B> {
        &self.inner
    }

    pub fn into_read_only(self) -> ReadOnlyRepository<B> {
        self.inner
    }

    /// Shuts the backend down, consuming the repository.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.inner.into_backend().shutdown().await
    }

    fn context(&self) -> OperationContext<'_, B> {
        OperationContext::new(self.inner.backend())
    }

    pub async fn add_one<D: Document>(&self, document: &D, options: &Options) -> DocumentStoreResult<()> {
        self.context().create().add_one(document, options).await
    }

    pub async fn add_many<D: Document>(&self, documents: &[D], options: &Options) -> DocumentStoreResult<()> {
        self.context().create().add_many(documents, options).await
    }

    pub async fn update_one<D: Document>(&self, document: &D, options: &Options) -> DocumentStoreResult<bool> {
        self.context().update().update_one(document, options).await
    }

    pub async fn update_one_by<D: Document>(
        &self,
        document: &D,
        update: impl Into<Update>,
        options: &Options,
    ) -> DocumentStoreResult<bool> {
        self.context()
            .update()
            .update_one_by(document, update, options)
            .await
    }

    pub async fn update_one_where<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        update: impl Into<Update>,
        options: &Options,
    ) -> DocumentStoreResult<bool> {
        self.context()
            .update()
            .update_one_where::<D>(criteria, update, options)
            .await
    }

    pub async fn update_one_field<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        value: impl Into<Bson>,
        options: &Options,
    ) -> DocumentStoreResult<bool> {
        self.context()
            .update()
            .update_one_field::<D>(criteria, field, value, options)
            .await
    }

    pub async fn update_many<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        update: impl Into<Update>,
        options: &Options,
    ) -> DocumentStoreResult<u64> {
        self.context()
            .update()
            .update_many::<D>(criteria, update, options)
            .await
    }

    pub async fn update_many_field<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        value: impl Into<Bson>,
        options: &Options,
    ) -> DocumentStoreResult<u64> {
        self.context()
            .update()
            .update_many_field::<D>(criteria, field, value, options)
            .await
    }

    pub async fn delete_one<D: Document>(&self, document: &D, options: &Options) -> DocumentStoreResult<u64> {
        self.context().delete().delete_one(document, options).await
    }

    pub async fn delete_one_where<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        options: &Options,
    ) -> DocumentStoreResult<u64> {
        self.context()
            .delete()
            .delete_one_where::<D>(criteria, options)
            .await
    }

    pub async fn delete_many<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<u64> {
        self.context()
            .delete()
            .delete_many::<D>(criteria, options)
            .await
    }

    pub async fn delete_many_documents<D: Document>(&self, documents: &[D], options: &Options) -> DocumentStoreResult<u64> {
        self.context()
            .delete()
            .delete_many_documents(documents, options)
            .await
    }

    pub async fn create_ascending_index<D: Document>(
        &self,
        field: &str,
        index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        self.context()
            .index()
            .create_ascending_index::<D>(field, index_options, options)
            .await
    }

    pub async fn create_descending_index<D: Document>(
        &self,
        field: &str,
        index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        self.context()
            .index()
            .create_descending_index::<D>(field, index_options, options)
            .await
    }

    pub async fn create_text_index<D: Document>(
        &self,
        field: &str,
        index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        self.context()
            .index()
            .create_text_index::<D>(field, index_options, options)
            .await
    }

    pub async fn create_combined_text_index<D: Document>(
        &self,
        fields: &[&str],
        index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        self.context()
            .index()
            .create_combined_text_index::<D>(fields, index_options, options)
            .await
    }

    pub async fn drop_index<D: Document>(&self, name: &str, options: &Options) -> DocumentStoreResult<()> {
        self.context().index().drop_index::<D>(name, options).await
    }
}

impl<B: StoreBackend> Deref for Repository<B> {
    type Target = ReadOnlyRepository<B>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
