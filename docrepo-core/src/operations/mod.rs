//! Data-access operations, one component per family.
//!
//! Every family resolves the physical collection from the document type and the partition
//! key, translates filters and updates to native documents, and runs the backend call under
//! the caller's cancellation token and session. No state is kept between calls.

mod create;
mod delete;
mod index;
mod read;
mod update;

pub use create::Create;
pub use delete::Delete;
pub use index::{Index, default_index_name};
pub use read::{DocumentCursor, Read};
pub use update::UpdateOperations;

use bson::Document as NativeDocument;
use std::collections::HashMap;

use crate::{
    backend::StoreBackend,
    document::{Document, DocumentExt},
    error::DocumentStoreResult,
    options::Options,
    resolver::CollectionHandle,
};

/// The backend every operation family runs against.
pub struct OperationContext<'a, B: StoreBackend> {
    backend: &'a B,
}

impl<B: StoreBackend> Clone for OperationContext<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: StoreBackend> Copy for OperationContext<'_, B> {}

impl<'a, B: StoreBackend> OperationContext<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &'a B {
        self.backend
    }

    pub fn create(self) -> Create<'a, B> {
        Create::new(self)
    }

    pub fn read(self) -> Read<'a, B> {
        Read::new(self)
    }

    pub fn update(self) -> UpdateOperations<'a, B> {
        UpdateOperations::new(self)
    }

    pub fn delete(self) -> Delete<'a, B> {
        Delete::new(self)
    }

    pub fn index(self) -> Index<'a, B> {
        Index::new(self)
    }

    /// Resolves the collection of `D` under the partition key of `options`.
    pub(crate) fn collection<D: Document>(&self, options: &Options) -> CollectionHandle<'a, B> {
        CollectionHandle::resolve::<D>(self.backend, options.partition())
    }
}

/// The partition a document is written to: its own key, else the one in `options`.
pub(crate) fn partition_of<'d, D: Document>(document: &'d D, options: &'d Options) -> Option<&'d str> {
    document
        .partition_key()
        .filter(|key| !key.is_empty())
        .or_else(|| options.partition())
}

/// Converts documents to native form, grouped by partition in first-seen order.
pub(crate) fn group_by_partition<D: Document>(
    documents: &[D],
    options: &Options,
) -> DocumentStoreResult<Vec<(Option<String>, Vec<NativeDocument>)>> {
    let mut positions: HashMap<Option<String>, usize> = HashMap::new();
    let mut groups: Vec<(Option<String>, Vec<NativeDocument>)> = Vec::new();

    for document in documents {
        let partition = partition_of(document, options).map(str::to_string);
        let native = document.to_native()?;

        match positions.get(&partition) {
            Some(&position) => groups[position].1.push(native),
            None => {
                positions.insert(partition.clone(), groups.len());
                groups.push((partition, vec![native]));
            }
        }
    }

    Ok(groups)
}
