use bson::{Bson, Document as NativeDocument};
use tracing::debug;

use crate::{
    backend::{NativeContext, StoreBackend, UpdateOutcome},
    cancel::run_cancellable,
    document::{Document, DocumentExt},
    error::{DocumentStoreError, DocumentStoreResult},
    options::Options,
    query::Criteria,
    resolver::CollectionHandle,
    translate::{NativeUpdate, id_filter, replacement_for, to_native_filter, to_native_update},
    update::Update,
};

use super::{OperationContext, partition_of};

/// Update operations.
///
/// Single-document forms report `true` only when the stored value changed; setting a field
/// to the value it already holds matches the document but reports `false`.
pub struct UpdateOperations<'a, B: StoreBackend> {
    ctx: OperationContext<'a, B>,
}

impl<'a, B: StoreBackend> UpdateOperations<'a, B> {
    pub(crate) fn new(ctx: OperationContext<'a, B>) -> Self {
        Self { ctx }
    }

    async fn execute(
        &self,
        collection: CollectionHandle<'a, B>,
        operation: &'static str,
        filter: NativeDocument,
        update: NativeUpdate,
        multi: bool,
        options: &Options,
    ) -> DocumentStoreResult<UpdateOutcome> {
        debug!(target: "docrepo::ops", collection = %collection.name(), operation, multi, "update");

        let outcome = run_cancellable(
            options.cancellation.as_ref(),
            collection.backend().update(
                collection.name(),
                filter,
                update,
                multi,
                NativeContext::from_options(options),
            ),
        )
        .await?;

        debug!(
            target: "docrepo::ops",
            collection = %collection.name(),
            matched = outcome.matched,
            modified = outcome.modified,
            "update applied"
        );

        Ok(outcome)
    }

    /// Replaces the stored document having the same key, in the document's partition.
    pub async fn update_one<D: Document>(&self, document: &D, options: &Options) -> DocumentStoreResult<bool> {
        let collection = CollectionHandle::resolve::<D>(self.ctx.backend(), partition_of(document, options));
        let id = document.native_id();

        let replacement = match to_native_update(Update::Replace(document.to_native()?))? {
            NativeUpdate::Replace(body) => NativeUpdate::Replace(replacement_for(id.clone(), body)),
            modify => modify,
        };

        let outcome = self
            .execute(collection, "update_one", id_filter(id), replacement, false, options)
            .await?;

        Ok(outcome.modified == 1)
    }

    /// Applies `update` to the stored document having the same key as `document`.
    pub async fn update_one_by<D: Document>(
        &self,
        document: &D,
        update: impl Into<Update>,
        options: &Options,
    ) -> DocumentStoreResult<bool> {
        let collection = CollectionHandle::resolve::<D>(self.ctx.backend(), partition_of(document, options));
        let update = to_native_update(update.into())?;

        let outcome = self
            .execute(collection, "update_one_by", id_filter(document.native_id()), update, false, options)
            .await?;

        Ok(outcome.modified == 1)
    }

    /// Applies `update` to the first document matching `criteria`.
    pub async fn update_one_where<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        update: impl Into<Update>,
        options: &Options,
    ) -> DocumentStoreResult<bool> {
        let filter = to_native_filter(&criteria.into())?;
        let update = to_native_update(update.into())?;

        let outcome = self
            .execute(self.ctx.collection::<D>(options), "update_one_where", filter, update, false, options)
            .await?;

        Ok(outcome.modified == 1)
    }

    /// Sets `field` (a dotted path) on the first document matching `criteria`.
    pub async fn update_one_field<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        value: impl Into<Bson>,
        options: &Options,
    ) -> DocumentStoreResult<bool> {
        self.update_one_where::<D>(criteria, Update::set(field, value), options)
            .await
    }

    /// Applies `update` to every document matching `criteria`, returning the modified count.
    ///
    /// # Errors
    ///
    /// A replacement cannot target several documents and fails with
    /// [`InvalidQuery`](DocumentStoreError::InvalidQuery).
    pub async fn update_many<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        update: impl Into<Update>,
        options: &Options,
    ) -> DocumentStoreResult<u64> {
        let update = match to_native_update(update.into())? {
            NativeUpdate::Replace(_) => {
                return Err(DocumentStoreError::InvalidQuery(
                    "a replacement cannot be applied to many documents".to_string(),
                ));
            }
            modify => modify,
        };
        let filter = to_native_filter(&criteria.into())?;

        let outcome = self
            .execute(self.ctx.collection::<D>(options), "update_many", filter, update, true, options)
            .await?;

        Ok(outcome.modified)
    }

    /// Sets `field` on every document matching `criteria`, returning the modified count.
    pub async fn update_many_field<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        value: impl Into<Bson>,
        options: &Options,
    ) -> DocumentStoreResult<u64> {
        self.update_many::<D>(criteria, Update::set(field, value), options)
            .await
    }
}
