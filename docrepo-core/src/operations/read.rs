use bson::{Bson, Document as NativeDocument, doc};
use futures::{
    FutureExt, Stream,
    future::BoxFuture,
};
use serde::de::DeserializeOwned;
use std::{
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};
use tracing::debug;

use crate::{
    backend::{DocumentStream, FindSpec, NativeContext, StoreBackend},
    cancel::{CancellationToken, run_cancellable},
    document::{Document, DocumentExt, ID_FIELD, from_bson, from_document},
    error::{DocumentStoreError, DocumentStoreResult},
    options::Options,
    page::{Page, PageRequest},
    projection::{Grouping, Projection},
    query::{Criteria, Sort},
    translate::{id_filter, to_native_filter},
};

use super::OperationContext;

/// Read operations.
pub struct Read<'a, B: StoreBackend> {
    ctx: OperationContext<'a, B>,
}

impl<'a, B: StoreBackend> Read<'a, B> {
    pub(crate) fn new(ctx: OperationContext<'a, B>) -> Self {
        Self { ctx }
    }

    async fn find_native<D: Document>(
        &self,
        operation: &'static str,
        spec: FindSpec,
        options: &Options,
    ) -> DocumentStoreResult<Vec<NativeDocument>> {
        let collection = self.ctx.collection::<D>(options);
        debug!(target: "docrepo::ops", collection = %collection.name(), operation, "find");

        run_cancellable(
            options.cancellation.as_ref(),
            collection
                .backend()
                .find(collection.name(), spec, NativeContext::from_options(options)),
        )
        .await
    }

    async fn aggregate_native<D: Document>(
        &self,
        operation: &'static str,
        pipeline: Vec<NativeDocument>,
        options: &Options,
    ) -> DocumentStoreResult<Vec<NativeDocument>> {
        let collection = self.ctx.collection::<D>(options);
        debug!(target: "docrepo::ops", collection = %collection.name(), operation, "aggregate");

        run_cancellable(
            options.cancellation.as_ref(),
            collection
                .backend()
                .aggregate(collection.name(), pipeline, NativeContext::from_options(options)),
        )
        .await
    }

    async fn find_first<D: Document>(
        &self,
        operation: &'static str,
        spec: FindSpec,
        options: &Options,
    ) -> DocumentStoreResult<Option<D>> {
        self.find_native::<D>(operation, spec.with_limit(1), options)
            .await?
            .into_iter()
            .next()
            .map(D::from_native)
            .transpose()
    }

    /// Returns the document with the given key, if present in the partition.
    pub async fn get_by_id<D: Document>(&self, id: &D::Key, options: &Options) -> DocumentStoreResult<Option<D>> {
        let filter = id_filter(id.clone().into());

        self.find_first("get_by_id", FindSpec::new(filter), options)
            .await
    }

    /// Returns the first document matching `criteria`.
    pub async fn get_one<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        options: &Options,
    ) -> DocumentStoreResult<Option<D>> {
        let filter = to_native_filter(&criteria.into())?;

        self.find_first("get_one", FindSpec::new(filter), options)
            .await
    }

    /// Returns every document matching `criteria`.
    pub async fn get_all<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        options: &Options,
    ) -> DocumentStoreResult<Vec<D>> {
        let filter = to_native_filter(&criteria.into())?;

        self.find_native::<D>("get_all", FindSpec::new(filter), options)
            .await?
            .into_iter()
            .map(D::from_native)
            .collect()
    }

    /// Returns `true` if at least one document matches `criteria`.
    pub async fn any<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<bool> {
        let filter = to_native_filter(&criteria.into())?;

        Ok(self.count_native::<D>("any", filter, Some(1), options).await? > 0)
    }

    /// Counts the documents matching `criteria`.
    pub async fn count<D: Document>(&self, criteria: impl Into<Criteria>, options: &Options) -> DocumentStoreResult<u64> {
        let filter = to_native_filter(&criteria.into())?;

        self.count_native::<D>("count", filter, None, options)
            .await
    }

    async fn count_native<D: Document>(
        &self,
        operation: &'static str,
        filter: NativeDocument,
        limit: Option<u64>,
        options: &Options,
    ) -> DocumentStoreResult<u64> {
        let collection = self.ctx.collection::<D>(options);
        debug!(target: "docrepo::ops", collection = %collection.name(), operation, "count");

        run_cancellable(
            options.cancellation.as_ref(),
            collection
                .backend()
                .count(collection.name(), filter, limit, NativeContext::from_options(options)),
        )
        .await
    }

    /// Returns the matching document with the smallest value at `field`.
    pub async fn get_by_min<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<D>> {
        let filter = to_native_filter(&criteria.into())?;
        let spec = FindSpec::new(filter).with_sort(Sort::asc(field).to_native());

        self.find_first("get_by_min", spec, options).await
    }

    /// Returns the matching document with the largest value at `field`.
    pub async fn get_by_max<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<D>> {
        let filter = to_native_filter(&criteria.into())?;
        let spec = FindSpec::new(filter).with_sort(Sort::desc(field).to_native());

        self.find_first("get_by_max", spec, options).await
    }

    /// Returns the smallest value at `field` among matching documents.
    pub async fn get_min_value<D: Document, V: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<V>> {
        self.extremal_value::<D, V>("get_min_value", criteria.into(), Sort::asc(field), field, options)
            .await
    }

    /// Returns the largest value at `field` among matching documents.
    pub async fn get_max_value<D: Document, V: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<V>> {
        self.extremal_value::<D, V>("get_max_value", criteria.into(), Sort::desc(field), field, options)
            .await
    }

    async fn extremal_value<D: Document, V: DeserializeOwned>(
        &self,
        operation: &'static str,
        criteria: Criteria,
        sort: Sort,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<Option<V>> {
        // Missing and null values sort first natively and would shadow the minimum.
        let mut present = NativeDocument::new();
        present.insert(field, doc! { "$ne": Bson::Null });
        let filter = doc! { "$and": [to_native_filter(&criteria)?, present] };
        let projection = if field == ID_FIELD {
            doc! { ID_FIELD: 1 }
        } else {
            let mut projection = doc! { ID_FIELD: 0 };
            projection.insert(field, 1);
            projection
        };
        let spec = FindSpec::new(filter)
            .with_sort(sort.to_native())
            .with_projection(projection)
            .with_limit(1);

        let first = self.find_native::<D>(operation, spec, options).await?.into_iter().next();

        match first.as_ref().and_then(|document| lookup_path(document, field)) {
            Some(value) => Ok(Some(from_bson(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Opens a forward-only cursor over the documents matching `criteria`.
    ///
    /// The cursor checks the cancellation token of `options` on every advance.
    pub async fn get_cursor<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        options: &Options,
    ) -> DocumentStoreResult<DocumentCursor<D>> {
        let filter = to_native_filter(&criteria.into())?;
        let collection = self.ctx.collection::<D>(options);
        debug!(target: "docrepo::ops", collection = %collection.name(), "get_cursor");

        let stream = run_cancellable(
            options.cancellation.as_ref(),
            collection.backend().find_stream(
                collection.name(),
                FindSpec::new(filter),
                NativeContext::from_options(options),
            ),
        )
        .await?;

        Ok(DocumentCursor::new(stream, options.cancellation.clone()))
    }

    /// Returns one window of the matching documents, sorted by `request.sort` (or by key).
    pub async fn get_sorted_paginated<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        request: &PageRequest,
        options: &Options,
    ) -> DocumentStoreResult<Vec<D>> {
        let filter = to_native_filter(&criteria.into())?;

        self.page_items::<D>("get_sorted_paginated", filter, request, options)
            .await
    }

    /// Returns one window of the matching documents with the total count and page navigation.
    pub async fn get_paginated<D: Document>(
        &self,
        criteria: impl Into<Criteria>,
        request: &PageRequest,
        options: &Options,
    ) -> DocumentStoreResult<Page<D>> {
        let filter = to_native_filter(&criteria.into())?;
        let count = self
            .count_native::<D>("get_paginated", filter.clone(), None, options)
            .await?;
        let items = self
            .page_items::<D>("get_paginated", filter, request, options)
            .await?;

        Ok(request.paginate(items, count))
    }

    async fn page_items<D: Document>(
        &self,
        operation: &'static str,
        filter: NativeDocument,
        request: &PageRequest,
        options: &Options,
    ) -> DocumentStoreResult<Vec<D>> {
        // A zero limit means "no limit" natively.
        if request.take == 0 {
            return Ok(Vec::new());
        }

        let sort = request
            .sort
            .as_ref()
            .map(Sort::to_native)
            .unwrap_or_else(|| doc! { ID_FIELD: 1 });
        let spec = FindSpec::new(filter)
            .with_sort(sort)
            .with_skip(request.skip)
            .with_limit(i64::try_from(request.take).unwrap_or(i64::MAX));

        self.find_native::<D>(operation, spec, options)
            .await?
            .into_iter()
            .map(D::from_native)
            .collect()
    }

    /// Groups the matching documents and returns one `R` per group, ordered by group key.
    ///
    /// `R` reads the group key from `_id` and one field per accumulator of `grouping`.
    pub async fn group_by<D: Document, R: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        grouping: &Grouping,
        options: &Options,
    ) -> DocumentStoreResult<Vec<R>> {
        let filter = to_native_filter(&criteria.into())?;
        let pipeline = vec![
            doc! { "$match": filter },
            grouping.to_stage(),
            doc! { "$sort": { ID_FIELD: 1 } },
        ];

        self.aggregate_native::<D>("group_by", pipeline, options)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Returns the first matching document reshaped by `projection`.
    pub async fn project_one<D: Document, P: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        projection: &Projection,
        options: &Options,
    ) -> DocumentStoreResult<Option<P>> {
        let filter = to_native_filter(&criteria.into())?;
        let spec = FindSpec::new(filter)
            .with_projection(projection.to_native())
            .with_limit(1);

        self.find_native::<D>("project_one", spec, options)
            .await?
            .into_iter()
            .next()
            .map(from_document)
            .transpose()
    }

    /// Returns every matching document reshaped by `projection`.
    pub async fn project_many<D: Document, P: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        projection: &Projection,
        options: &Options,
    ) -> DocumentStoreResult<Vec<P>> {
        let filter = to_native_filter(&criteria.into())?;
        let spec = FindSpec::new(filter).with_projection(projection.to_native());

        self.find_native::<D>("project_many", spec, options)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Sums the numeric values at `field` over the matching documents.
    ///
    /// Returns zero when nothing matches. The native sum type follows the summed values,
    /// so `T` must accept it (`i64` for integers, `f64` for any numbers).
    pub async fn sum_by<D: Document, T: DeserializeOwned>(
        &self,
        criteria: impl Into<Criteria>,
        field: &str,
        options: &Options,
    ) -> DocumentStoreResult<T> {
        let filter = to_native_filter(&criteria.into())?;
        let pipeline = vec![
            doc! { "$match": filter },
            doc! { "$group": { ID_FIELD: Bson::Null, "total": { "$sum": format!("${field}") } } },
        ];

        let total = self
            .aggregate_native::<D>("sum_by", pipeline, options)
            .await?
            .into_iter()
            .next()
            .and_then(|mut group| group.remove("total"))
            .unwrap_or(Bson::Int32(0));

        from_bson(total)
    }
}

/// Returns the value at a dotted path.
pub(crate) fn lookup_path<'d>(document: &'d NativeDocument, path: &str) -> Option<&'d Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// A forward-only, non-restartable cursor over typed documents.
///
/// Dropping the cursor releases the native cursor. Once the cancellation token fires the
/// cursor yields a single [`DocumentStoreError::Cancelled`] and then ends.
pub struct DocumentCursor<D> {
    stream: DocumentStream,
    cancelled: Option<BoxFuture<'static, ()>>,
    finished: bool,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document> DocumentCursor<D> {
    pub(crate) fn new(stream: DocumentStream, cancellation: Option<CancellationToken>) -> Self {
        Self {
            stream,
            cancelled: cancellation.map(|token| async move { token.cancelled().await }.boxed()),
            finished: false,
            _marker: PhantomData,
        }
    }
}

impl<D: Document> Stream for DocumentCursor<D> {
    type Item = DocumentStoreResult<D>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }

        // Polled first so a pending advance still wakes on cancellation.
        if let Some(cancelled) = this.cancelled.as_mut() {
            if cancelled.as_mut().poll(cx).is_ready() {
                this.finished = true;
                return Poll::Ready(Some(Err(DocumentStoreError::Cancelled)));
            }
        }

        match this.stream.as_mut().poll_next(cx) {
            Poll::Ready(Some(result)) => Poll::Ready(Some(result.and_then(D::from_native))),
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, stream};
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Row {
        id: i32,
    }

    impl Document for Row {
        type Key = i32;

        fn id(&self) -> &i32 {
            &self.id
        }
    }

    #[tokio::test]
    async fn waiting_cursor_wakes_on_cancellation() {
        let token = CancellationToken::new();
        let mut cursor = DocumentCursor::<Row>::new(stream::pending().boxed(), Some(token.clone()));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let advanced = tokio::time::timeout(Duration::from_secs(5), cursor.next())
            .await
            .expect("cursor should wake once cancelled");

        assert!(matches!(advanced, Some(Err(DocumentStoreError::Cancelled))));
        assert!(cursor.next().await.is_none());
    }

    #[tokio::test]
    async fn cursor_without_token_drains_the_stream() {
        let rows: Vec<DocumentStoreResult<NativeDocument>> = vec![Ok(doc! { "id": 1 }), Ok(doc! { "id": 2 })];
        let cursor = DocumentCursor::<Row>::new(stream::iter(rows).boxed(), None);

        let ids: Vec<i32> = cursor.map(|row| row.unwrap().id).collect().await;

        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn lookup_path_walks_documents_and_arrays() {
        let document = doc! { "a": { "b": [ { "c": 5 } ] } };

        assert_eq!(lookup_path(&document, "a.b.0.c"), Some(&Bson::Int32(5)));
        assert_eq!(lookup_path(&document, "a.x"), None);
    }
}
