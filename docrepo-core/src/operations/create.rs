use tracing::debug;

use crate::{
    backend::{NativeContext, StoreBackend},
    cancel::run_cancellable,
    document::{Document, DocumentExt},
    error::DocumentStoreResult,
    options::Options,
    resolver::CollectionHandle,
};

use super::{OperationContext, group_by_partition, partition_of};

/// Insert operations.
pub struct Create<'a, B: StoreBackend> {
    ctx: OperationContext<'a, B>,
}

impl<'a, B: StoreBackend> Create<'a, B> {
    pub(crate) fn new(ctx: OperationContext<'a, B>) -> Self {
        Self { ctx }
    }

    /// Inserts one document into the collection of its partition.
    ///
    /// # Errors
    ///
    /// Fails with [`DocumentAlreadyExists`](crate::error::DocumentStoreError::DocumentAlreadyExists)
    /// or the driver's duplicate key error when the key is taken.
    pub async fn add_one<D: Document>(&self, document: &D, options: &Options) -> DocumentStoreResult<()> {
        let collection = CollectionHandle::resolve::<D>(self.ctx.backend(), partition_of(document, options));
        debug!(target: "docrepo::ops", collection = %collection.name(), "add_one");

        let native = document.to_native()?;

        run_cancellable(
            options.cancellation.as_ref(),
            collection.backend().insert_many(
                collection.name(),
                vec![native],
                NativeContext::from_options(options),
            ),
        )
        .await
    }

    /// Inserts documents, one bulk insert per partition.
    ///
    /// Documents inserted before a failure stay inserted.
    pub async fn add_many<D: Document>(&self, documents: &[D], options: &Options) -> DocumentStoreResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        for (partition, natives) in group_by_partition(documents, options)? {
            let collection = CollectionHandle::resolve::<D>(self.ctx.backend(), partition.as_deref());
            debug!(
                target: "docrepo::ops",
                collection = %collection.name(),
                count = natives.len(),
                "add_many"
            );

            run_cancellable(
                options.cancellation.as_ref(),
                collection.backend().insert_many(
                    collection.name(),
                    natives,
                    NativeContext::from_options(options),
                ),
            )
            .await?;
        }

        Ok(())
    }
}
