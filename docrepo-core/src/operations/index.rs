use bson::{Bson, Document as NativeDocument};
use tracing::debug;

use crate::{
    backend::{NativeContext, StoreBackend},
    cancel::run_cancellable,
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult},
    options::{IndexOptions, Options},
};

use super::OperationContext;

/// Index management.
///
/// Creating an index whose definition already exists succeeds and returns its name.
/// Indexes with the same keys under different names are not deduplicated.
pub struct Index<'a, B: StoreBackend> {
    ctx: OperationContext<'a, B>,
}

impl<'a, B: StoreBackend> Index<'a, B> {
    pub(crate) fn new(ctx: OperationContext<'a, B>) -> Self {
        Self { ctx }
    }

    async fn create<D: Document>(
        &self,
        operation: &'static str,
        keys: NativeDocument,
        mut index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        let collection = self.ctx.collection::<D>(options);
        if index_options.name.is_none() {
            index_options.name = Some(default_index_name(&keys));
        }
        debug!(
            target: "docrepo::ops",
            collection = %collection.name(),
            operation,
            name = index_options.name.as_deref().unwrap_or_default(),
            "create_index"
        );

        run_cancellable(
            options.cancellation.as_ref(),
            collection.backend().create_index(
                collection.name(),
                keys,
                index_options,
                NativeContext::from_options(options),
            ),
        )
        .await
    }

    pub async fn create_ascending_index<D: Document>(
        &self,
        field: &str,
        index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        let mut keys = NativeDocument::new();
        keys.insert(field, 1);

        self.create::<D>("create_ascending_index", keys, index_options, options)
            .await
    }

    pub async fn create_descending_index<D: Document>(
        &self,
        field: &str,
        index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        let mut keys = NativeDocument::new();
        keys.insert(field, -1);

        self.create::<D>("create_descending_index", keys, index_options, options)
            .await
    }

    pub async fn create_text_index<D: Document>(
        &self,
        field: &str,
        index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        self.create_combined_text_index::<D>(&[field], index_options, options)
            .await
    }

    /// Creates a single text index spanning every field in `fields`.
    pub async fn create_combined_text_index<D: Document>(
        &self,
        fields: &[&str],
        index_options: IndexOptions,
        options: &Options,
    ) -> DocumentStoreResult<String> {
        if fields.is_empty() {
            return Err(DocumentStoreError::InvalidQuery(
                "a text index needs at least one field".to_string(),
            ));
        }

        let mut keys = NativeDocument::new();
        for field in fields {
            keys.insert(*field, "text");
        }

        self.create::<D>("create_combined_text_index", keys, index_options, options)
            .await
    }

    pub async fn drop_index<D: Document>(&self, name: &str, options: &Options) -> DocumentStoreResult<()> {
        let collection = self.ctx.collection::<D>(options);
        debug!(target: "docrepo::ops", collection = %collection.name(), name, "drop_index");

        run_cancellable(
            options.cancellation.as_ref(),
            collection
                .backend()
                .drop_index(collection.name(), name, NativeContext::from_options(options)),
        )
        .await
    }

    /// Lists the index names of the collection, including the implicit `_id_` index.
    pub async fn get_index_names<D: Document>(&self, options: &Options) -> DocumentStoreResult<Vec<String>> {
        let collection = self.ctx.collection::<D>(options);
        debug!(target: "docrepo::ops", collection = %collection.name(), "get_index_names");

        run_cancellable(
            options.cancellation.as_ref(),
            collection
                .backend()
                .list_index_names(collection.name(), NativeContext::from_options(options)),
        )
        .await
    }
}

/// The native default name of an index: each key and its kind joined by `_`.
pub fn default_index_name(keys: &NativeDocument) -> String {
    keys.iter()
        .map(|(field, kind)| match kind {
            Bson::String(kind) => format!("{field}_{kind}"),
            Bson::Int32(n) => format!("{field}_{n}"),
            Bson::Int64(n) => format!("{field}_{n}"),
            Bson::Double(n) => format!("{field}_{n}"),
            other => format!("{field}_{other}"),
        })
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn default_names_follow_native_convention() {
        assert_eq!(default_index_name(&doc! { "a": 1 }), "a_1");
        assert_eq!(default_index_name(&doc! { "a": -1 }), "a_-1");
        assert_eq!(default_index_name(&doc! { "a": "text", "b": "text" }), "a_text_b_text");
    }
}
