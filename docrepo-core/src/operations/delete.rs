use bson::{Bson, Document as NativeDocument, doc};
use tracing::debug;

use crate::{
    backend::{NativeContext, StoreBackend},
    cancel::run_cancellable,
    document::{Document, DocumentExt, ID_FIELD},
    error::DocumentStoreResult,
    options::Options,
    query::Criteria,
    resolver::CollectionHandle,
    translate::{id_filter, to_native_filter},
};

use super::{OperationContext, partition_of};

/// Delete operations. Every form returns the number of documents deleted.
pub struct Delete<'a, B: StoreBackend> {
    ctx: OperationContext<'a, B>,
}

impl<'a, B: StoreBackend> Delete<'a, B> {
    pub(crate) fn new(ctx: OperationContext<'a, B>) -> Self {
        Self { ctx }
    }

    async fn execute(
        &self,
        collection: CollectionHandle<'a, B>,
        operation: &'static str,
        filter: NativeDocument,
        multi: bool,
        options: &Options,
    ) -> DocumentStoreResult<u64> {
        debug!(target: "docrepo::ops", collection = %collection.name(), operation, multi, "delete");

        run_cancellable(
            options.cancellation.as_ref(),
            collection.backend().delete(
                collection.name(),
                filter,
                multi,
                NativeContext::from_options(options),
            ),
        )
        .await
    }

    /// Deletes the stored document having the same key, in the document's partition.
    pub async fn delete_one<D: Document>(&self, document: &D, options: &Options) -> DocumentStoreResult<u64> {
        let collection = CollectionHandle::resolve::<D>(self.ctx.backend(), partition_of(document, options));

        self.execute(collection, "delete_one", id_filter(document.native_id()), false, options)
            .await
    }

    /// Deletes the first document matching `criteria`.
    pub async fn delete_one_where<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        options: &Options,
    ) -> DocumentStoreResult<u64> {
        let filter = to_native_filter(&criteria.into())?;

        self.execute(self.ctx.collection::<D>(options), "delete_one_where", filter, false, options)
            .await
    }

    /// Deletes every document matching `criteria`.
    pub async fn delete_many<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<u64> {
        let filter = to_native_filter(&criteria.into())?;

        self.execute(self.ctx.collection::<D>(options), "delete_many", filter, true, options)
            .await
    }

    /// Deletes the stored documents having the keys of `documents`, partition by partition.
    pub async fn delete_many_documents<D: Document>(&self, documents: &[D], options: &Options) -> DocumentStoreResult<u64> {
        let mut groups: Vec<(Option<&str>, Vec<Bson>)> = Vec::new();

        for document in documents {
            let partition = partition_of(document, options);
            match groups.iter_mut().find(|(key, _)| *key == partition) {
                Some((_, ids)) => ids.push(document.native_id()),
                None => groups.push((partition, vec![document.native_id()])),
            }
        }

        let mut deleted = 0;
        for (partition, ids) in groups {
            let collection = CollectionHandle::resolve::<D>(self.ctx.backend(), partition);
            let filter = doc! { ID_FIELD: { "$in": ids } };

            deleted += self
                .execute(collection, "delete_many_documents", filter, true, options)
                .await?;
        }

        Ok(deleted)
    }
}
