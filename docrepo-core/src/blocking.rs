//! Synchronous repository facade.
//!
//! [`BlockingRepository`] runs every operation of [`Repository`] to completion on a private
//! current-thread runtime, blocking the calling thread. It must not be used from inside an
//! async context.

use bson::Bson;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::runtime::{Builder, Runtime};

use crate::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult},
    operations::DocumentCursor,
    options::{IndexOptions, Options},
    page::{Page, PageRequest},
    projection::{Grouping, Projection},
    query::Criteria,
    repository::Repository,
    session::SessionHandle,
    update::Update,
};

fn runtime() -> DocumentStoreResult<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| DocumentStoreError::Initialization(e.to_string()))
}

/// A repository whose operations block until they complete.
#[derive(Debug)]
pub struct BlockingRepository<B: StoreBackend> {
    repository: Repository<B>,
    runtime: Runtime,
}

impl<B: StoreBackend> BlockingRepository<B> {
    pub fn new(backend: B) -> DocumentStoreResult<Self> {
        Ok(Self {
            repository: Repository::new(backend),
            runtime: runtime()?,
        })
    }

    /// Builds the backend on the repository's own runtime.
    pub fn connect<T>(builder: T) -> DocumentStoreResult<Self>
    where
        T: StoreBackendBuilder<Backend = B>,
    {
        let runtime = runtime()?;
        let backend = runtime.block_on(builder.build())?;

        Ok(Self {
            repository: Repository::new(backend),
            runtime,
        })
    }

    /// The async repository this facade drives.
    pub fn repository(&self) -> &Repository<B> {
        &self.repository
    }

    pub fn shutdown(self) -> DocumentStoreResult<()> {
        let Self { repository, runtime } = self;
        runtime.block_on(repository.shutdown())
    }

    pub fn start_session(&self) -> DocumentStoreResult<SessionHandle> {
        self.runtime.block_on(self.repository.start_session())
    }

    pub fn add_one<D: Document>(&self, document: &D, options: &Options) -> DocumentStoreResult<()> {
        self.runtime
            .block_on(self.repository.add_one(document, options))
    }

    pub fn add_many<D: Document>(&self, documents: &[D], options: &Options) -> DocumentStoreResult<()> {
        self.runtime
            .block_on(self.repository.add_many(documents, options))
    }

    pub fn get_by_id<D: Document>(&self, id: &D::Key, options: &Options) -> DocumentStoreResult<Option<D>> {
        self.runtime
            .block_on(self.repository.get_by_id::<D>(id, options))
    }

    pub fn get_one<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<Option<D>> {
        self.runtime
            .block_on(self.repository.get_one::<D>(criteria, options))
    }

    pub fn get_all<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<Vec<D>> {
        self.runtime
            .block_on(self.repository.get_all::<D>(criteria, options))
    }

    pub fn any<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<bool> {
        self.runtime
            .block_on(self.repository.any::<D>(criteria, options))
    }

    pub fn count<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<u64> {
        self.runtime
            .block_on(self.repository.count::<D>(criteria, options))
    }

    pub fn get_by_min<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<D>> {
        self.runtime
            .block_on(self.repository.get_by_min::<D>(criteria, field, options))
    }

    pub fn get_by_max<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<D>> {
        self.runtime
            .block_on(self.repository.get_by_max::<D>(criteria, field, options))
    }

    pub fn get_min_value<D: Document, V: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<V>> {
        self.runtime
            .block_on(self.repository.get_min_value::<D, V>(criteria, field, options))
    }

    pub fn get_max_value<D: Document, V: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<V>> {
        self.runtime
            .block_on(self.repository.get_max_value::<D, V>(criteria, field, options))
    }

    /// Opens a cursor whose advances block the calling thread.
    pub fn get_cursor<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        options: &Options,
    ) -> DocumentStoreResult<BlockingCursor<'_, D>> {
        let cursor = self
            .runtime
            .block_on(self.repository.get_cursor::<D>(criteria, options))?;

        Ok(BlockingCursor { cursor, runtime: &self.runtime })
    }

    pub fn get_sorted_paginated<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        request: &PageRequest,
        options: &Options,
    ) -> DocumentStoreResult<Vec<D>> {
        self.runtime
            .block_on(self.repository.get_sorted_paginated::<D>(criteria, request, options))
    }

    pub fn get_paginated<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        request: &PageRequest,
        options: &Options,
    ) -> DocumentStoreResult<Page<D>> {
        self.runtime
            .block_on(self.repository.get_paginated::<D>(criteria, request, options))
    }

    pub fn group_by<D: Document, R: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        grouping: &Grouping,
        options: &Options,
    ) -> DocumentStoreResult<Vec<R>> {
        self.runtime
            .block_on(self.repository.group_by::<D, R>(criteria, grouping, options))
    }

    pub fn project_one<D: Document, P: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        projection: &Projection,
        options: &Options,
    ) -> DocumentStoreResult<Option<P>> {
        self.runtime
            .block_on(self.repository.project_one::<D, P>(criteria, projection, options))
    }

    pub fn project_many<D: Document, P: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        projection: &Projection,
        options: &Options,
    ) -> DocumentStoreResult<Vec<P>> {
        self.runtime
            .block_on(self.repository.project_many::<D, P>(criteria, projection, options))
    }

    pub fn sum_by<D: Document, T: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<T> {
        self.runtime
            .block_on(self.repository.sum_by::<D, T>(criteria, field, options))
    }

    pub fn update_one<D: Document>(&self, document: &D, options: &Options) -> DocumentStoreResult<bool> {
        self.runtime
            .block_on(self.repository.update_one(document, options))
    }

    pub fn update_one_by<D: Document>(
        &self,
        document: &D,
        update: impl Into<Update>,
        options: &Options,
    ) -> DocumentStoreResult<bool> {
        self.runtime
            .block_on(self.repository.update_one_by(document, update, options))
    }

    pub fn update_one_where<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        update: impl Into<Update>,
        options: &Options,
    ) -> DocumentStoreResult<bool> {
        self.runtime
            .block_on(self.repository.update_one_where::<D>(criteria, update, options))
    }

    pub fn update_one_field<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        value: impl Into<Bson>,
        options: &Options,
    ) -> DocumentStoreResult<bool> {
        self.runtime
            .block_on(self.repository.update_one_field::<D>(criteria, field, value, options))
    }

    pub fn update_many<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        update: impl Into<Update>,
        options: &Options,
    ) -> DocumentStoreResult<u64> {
        self.runtime
            .block_on(self.repository.update_many::<D>(criteria, update, options))
    }

    pub fn update_many_field<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        value: impl Into<Bson>,
        options: &Options,
    ) -> DocumentStoreResult<u64> {
        self.runtime
            .block_on(self.repository.update_many_field::<D>(criteria, field, value, options))
    }

    pub fn delete_one<D: Document>(&self, document: &D, options: &Options) -> DocumentStoreResult<u64> {
        self.runtime
            .block_on(self.repository.delete_one(document, options))
    }

    pub fn delete_one_where<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<u64> {
        self.runtime
            .block_on(self.repository.delete_one_where::<D>(criteria, options))
    }

    pub fn delete_many<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<u64> {
        self.runtime
            .block_on(self.repository.delete_many::<D>(criteria, options))
    }

    pub fn delete_many_documents<D: Document>(&self, documents: &[D], options: &Options) -> DocumentStoreResult<u64> {
        self.runtime
            .block_on(self.repository.delete_many_documents(documents, options))
    }

    pub fn create_ascending_index<D: Document>(
        &self,
        field: &str,
        index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        self.runtime
            .block_on(self.repository.create_ascending_index::<D>(field, index_options, options))
    }

    pub fn create_descending_index<D: Document>(
        &self,
        field: &str,
        index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        self.runtime
            .block_on(self.repository.create_descending_index::<D>(field, index_options, options))
    }

    pub fn create_text_index<D: Document>(
        &self,
        field: &str,
        index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        self.runtime
            .block_on(self.repository.create_text_index::<D>(field, index_options, options))
    }

    pub fn create_combined_text_index<D: Document>(
        &self,
        fields: &[&str],
        index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        self.runtime
            .block_on(self.repository.create_combined_text_index::<D>(fields, index_options, options))
    }

    pub fn drop_index<D: Document>(&self, name: &str, options: &Options) -> DocumentStoreResult<()> {
        self.runtime
            .block_on(self.repository.drop_index::<D>(name, options))
    }

    pub fn get_index_names<D: Document>(&self, options: &Options) -> DocumentStoreResult<Vec<String>> {
        self.runtime
            .block_on(self.repository.get_index_names::<D>(options))
    }
}

/// A [`DocumentCursor`] advanced by blocking the calling thread.
pub struct BlockingCursor<'a, D> {
    cursor: DocumentCursor<D>,
    runtime: &'a Runtime,
}

impl<D: Document> Iterator for BlockingCursor<'_, D> {
    type Item = DocumentStoreResult<D>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.cursor.next())
    }
}
