//! In-memory storage implementation for document stores.
//!
//! This module provides an in-process backend that keeps native documents in insertion order
//! under async-aware read-write locks and interprets the native filter, update, projection,
//! sort and aggregation documents itself.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering as AtomicOrdering},
    },
};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;
use tracing::debug;

use docrepo_core::{
    backend::{DocumentStream, FindSpec, NativeContext, StoreBackend, StoreBackendBuilder, UpdateOutcome},
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    operations::default_index_name,
    options::IndexOptions,
    session::SessionHandle,
    translate::NativeUpdate,
};

use crate::{
    aggregate::run_pipeline,
    evaluator::{DocumentEvaluator, sort_documents},
    projection::project,
    update::apply_update,
    value::{get_path, values_equal},
};

/// Name of the index every collection carries on `_id`.
pub const ID_INDEX_NAME: &str = "_id_";

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq)]
struct IndexEntry {
    name: String,
    keys: Document,
    unique: bool,
    sparse: bool,
}

impl IndexEntry {
    /// The indexed values of `document`, or `None` when a sparse index skips it.
    fn key_of(&self, document: &Document) -> Option<Vec<Bson>> {
        let values: Vec<Option<&Bson>> = self.keys.keys().map(|path| get_path(document, path)).collect();

        if self.sparse && values.iter().all(Option::is_none) {
            return None;
        }

        Some(values.into_iter().map(|v| v.cloned().unwrap_or(Bson::Null)).collect())
    }
}

#[derive(Debug, Default)]
struct Collection {
    documents: Vec<Document>,
    indexes: Vec<IndexEntry>,
}

impl Collection {
    fn position_of(&self, id: &Bson) -> Option<usize> {
        self.documents
            .iter()
            .position(|document| document.get(ID_FIELD).is_some_and(|existing| values_equal(existing, id)))
    }

    /// Checks `candidate` against the unique indexes, ignoring the document at `skip`.
    fn check_unique(&self, name: &str, candidate: &Document, skip: Option<usize>) -> DocumentStoreResult<()> {
        for index in self.indexes.iter().filter(|index| index.unique) {
            let Some(key) = index.key_of(candidate) else {
                continue;
            };

            let clash = self.documents.iter().enumerate().any(|(position, existing)| {
                Some(position) != skip
                    && index.key_of(existing).is_some_and(|other| {
                        other.iter().zip(key.iter()).all(|(a, b)| values_equal(a, b))
                    })
            });

            if clash {
                return Err(DocumentStoreError::DocumentAlreadyExists(
                    format!("{} (unique index {})", Bson::Array(key), index.name),
                    name.to_string(),
                ));
            }
        }

        Ok(())
    }

    fn matching(&self, filter: &Document, multi: bool) -> DocumentStoreResult<Vec<usize>> {
        let evaluator = DocumentEvaluator::new(filter);
        let mut positions = Vec::new();

        for (position, document) in self.documents.iter().enumerate() {
            if evaluator.matches(document)? {
                positions.push(position);
                if !multi {
                    break;
                }
            }
        }

        Ok(positions)
    }
}

type CollectionMap = HashMap<String, Collection>;

/// The session object handed out by [`InMemoryStore::start_session`].
#[derive(Debug)]
pub struct InMemorySession {
    id: u64,
    store_id: u64,
}

impl InMemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it to be
/// shared across async tasks. Clones share the same collections and accept each other's
/// sessions.
///
/// Queries scan every document of a collection; indexes are tracked for their names and
/// uniqueness constraints only.
///
/// # Example
///
/// ```ignore
/// use docrepo_memory::InMemoryStore;
/// use docrepo::prelude::*;
///
/// let repository = Repository::new(InMemoryStore::new());
/// repository.add_one(&user, &Options::default()).await?;
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    collections: Arc<RwLock<CollectionMap>>,
    store_id: u64,
    next_session: Arc<AtomicU64>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(CollectionMap::new())),
            store_id: NEXT_STORE_ID.fetch_add(1, AtomicOrdering::Relaxed),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Names of the collections written so far, sorted.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn check_session(&self, ctx: &NativeContext<'_>) -> DocumentStoreResult<()> {
        let Some(handle) = ctx.session else {
            return Ok(());
        };

        let mut guard = handle.lock().await;
        let session = guard.downcast_mut::<InMemorySession>()?;

        if session.store_id != self.store_id {
            return Err(DocumentStoreError::InvalidSession(format!(
                "session {} was started by another in-memory store",
                session.id
            )));
        }

        Ok(())
    }

    async fn select(&self, collection: &str, spec: FindSpec) -> DocumentStoreResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let Some(stored) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut selected: Vec<Document> = DocumentEvaluator::new(&spec.filter)
            .filter_documents(&stored.documents)?
            .into_iter()
            .cloned()
            .collect();
        drop(collections);

        if let Some(sort) = &spec.sort {
            sort_documents(&mut selected, sort)?;
        }

        let skip = usize::try_from(spec.skip).unwrap_or(usize::MAX);
        // A negative limit means a single batch of that size.
        let take = match spec.limit {
            Some(0) | None => usize::MAX,
            Some(limit) => usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX),
        };

        selected
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|document| match &spec.projection {
                Some(projection) => project(&document, projection),
                None => Ok(document),
            })
            .collect()
    }
}

fn prepare_insert(mut document: Document) -> Document {
    if document.contains_key(ID_FIELD) {
        return document;
    }

    let mut prepared = Document::new();
    prepared.insert(ID_FIELD, ObjectId::new());
    for (key, value) in std::mem::take(&mut document) {
        prepared.insert(key, value);
    }
    prepared
}

fn replaced(existing: &Document, replacement: Document) -> DocumentStoreResult<Document> {
    let id = existing.get(ID_FIELD).cloned().unwrap_or(Bson::Null);

    if let Some(new_id) = replacement.get(ID_FIELD) {
        if !values_equal(new_id, &id) {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "replacement would change the immutable field '{ID_FIELD}' from {id} to {new_id}"
            )));
        }
    }

    let mut document = Document::new();
    document.insert(ID_FIELD, id);
    for (key, value) in replacement {
        if key != ID_FIELD {
            document.insert(key, value);
        }
    }

    Ok(document)
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<()> {
        self.check_session(&ctx).await?;

        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();

        for document in documents {
            let document = prepare_insert(document);
            let id = document.get(ID_FIELD).cloned().unwrap_or(Bson::Null);

            if stored.position_of(&id).is_some() {
                return Err(DocumentStoreError::DocumentAlreadyExists(id.to_string(), collection.to_string()));
            }
            stored.check_unique(collection, &document, None)?;

            stored.documents.push(document);
        }

        debug!(target: "docrepo::memory", collection, total = stored.documents.len(), "inserted");

        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.check_session(&ctx).await?;
        self.select(collection, spec).await
    }

    async fn find_stream(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<DocumentStream> {
        self.check_session(&ctx).await?;
        let documents = self.select(collection, spec).await?;

        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn count(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<u64>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64> {
        self.check_session(&ctx).await?;

        let collections = self.collections.read().await;
        let Some(stored) = collections.get(collection) else {
            return Ok(0);
        };

        let evaluator = DocumentEvaluator::new(&filter);
        let limit = limit.filter(|limit| *limit > 0).unwrap_or(u64::MAX);
        let mut count = 0;

        for document in &stored.documents {
            if count >= limit {
                break;
            }
            if evaluator.matches(document)? {
                count += 1;
            }
        }

        Ok(count)
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: NativeUpdate,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.check_session(&ctx).await?;

        let mut collections = self.collections.write().await;
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        let positions = stored.matching(&filter, multi)?;
        let mut outcome = UpdateOutcome { matched: positions.len() as u64, modified: 0 };

        for position in positions {
            let current = &stored.documents[position];
            let next = match &update {
                NativeUpdate::Replace(replacement) => replaced(current, replacement.clone())?,
                NativeUpdate::Modify(modifiers) => {
                    let mut next = current.clone();
                    apply_update(&mut next, modifiers)?;
                    next
                }
            };

            if &next == current {
                continue;
            }

            stored.check_unique(collection, &next, Some(position))?;
            stored.documents[position] = next;
            outcome.modified += 1;
        }

        Ok(outcome)
    }

    async fn delete(
        &self,
        collection: &str,
        filter: Document,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64> {
        self.check_session(&ctx).await?;

        let mut collections = self.collections.write().await;
        let Some(stored) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let positions = stored.matching(&filter, multi)?;
        for position in positions.iter().rev() {
            stored.documents.remove(*position);
        }

        Ok(positions.len() as u64)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.check_session(&ctx).await?;

        let documents = self
            .collections
            .read()
            .await
            .get(collection)
            .map(|stored| stored.documents.clone())
            .unwrap_or_default();

        run_pipeline(documents, &pipeline)
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<String> {
        self.check_session(&ctx).await?;

        if keys.is_empty() {
            return Err(DocumentStoreError::InvalidQuery("an index needs at least one key".to_string()));
        }

        let entry = IndexEntry {
            name: options.name.unwrap_or_else(|| default_index_name(&keys)),
            keys,
            unique: options.unique,
            sparse: options.sparse,
        };

        let mut collections = self.collections.write().await;
        let stored = collections.entry(collection.to_string()).or_default();

        if let Some(existing) = stored.indexes.iter().find(|index| index.name == entry.name) {
            if existing.keys != entry.keys {
                return Err(DocumentStoreError::Backend(format!(
                    "an index named {} already exists with different keys",
                    entry.name
                )));
            }
            return Ok(entry.name);
        }

        if entry.unique {
            let mut seen: Vec<Vec<Bson>> = Vec::new();
            for document in &stored.documents {
                if let Some(key) = entry.key_of(document) {
                    if seen.iter().any(|other| other.iter().zip(key.iter()).all(|(a, b)| values_equal(a, b))) {
                        return Err(DocumentStoreError::Backend(format!(
                            "cannot build unique index {}: duplicate key {}",
                            entry.name,
                            Bson::Array(key)
                        )));
                    }
                    seen.push(key);
                }
            }
        }

        debug!(target: "docrepo::memory", collection, index = %entry.name, "index created");
        let name = entry.name.clone();
        stored.indexes.push(entry);

        Ok(name)
    }

    async fn drop_index(&self, collection: &str, name: &str, ctx: NativeContext<'_>) -> DocumentStoreResult<()> {
        self.check_session(&ctx).await?;

        if name == ID_INDEX_NAME {
            return Err(DocumentStoreError::Backend(format!("cannot drop index {ID_INDEX_NAME}")));
        }

        let mut collections = self.collections.write().await;
        let stored = collections.get_mut(collection);
        let position = stored
            .as_ref()
            .and_then(|stored| stored.indexes.iter().position(|index| index.name == name));

        match (stored, position) {
            (Some(stored), Some(position)) => {
                stored.indexes.remove(position);
                Ok(())
            }
            _ => Err(DocumentStoreError::Backend(format!(
                "index not found with name [{name}] in collection {collection}"
            ))),
        }
    }

    async fn list_index_names(&self, collection: &str, ctx: NativeContext<'_>) -> DocumentStoreResult<Vec<String>> {
        self.check_session(&ctx).await?;

        let collections = self.collections.read().await;
        let Some(stored) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut names = vec![ID_INDEX_NAME.to_string()];
        names.extend(stored.indexes.iter().map(|index| index.name.clone()));

        Ok(names)
    }

    async fn start_session(&self) -> DocumentStoreResult<SessionHandle> {
        let id = self.next_session.fetch_add(1, AtomicOrdering::Relaxed);
        debug!(target: "docrepo::memory", session = id, "session started");

        Ok(SessionHandle::new(InMemorySession { id, store_id: self.store_id }))
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docrepo_memory::InMemoryStore;
/// use docrepo::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docrepo_core::query::QueryOptions;

    fn no_context(query: &QueryOptions) -> NativeContext<'_> {
        NativeContext::new(None, query)
    }

    #[tokio::test]
    async fn insert_assigns_missing_ids_and_rejects_duplicates() {
        let store = InMemoryStore::new();
        let query = QueryOptions::default();

        store
            .insert_many("docs", vec![doc! { "a": 1 }, doc! { "_id": 5, "a": 2 }], no_context(&query))
            .await
            .unwrap();

        let stored = store.find("docs", FindSpec::default(), no_context(&query)).await.unwrap();
        assert!(matches!(stored[0].get(ID_FIELD), Some(Bson::ObjectId(_))));

        let duplicate = store
            .insert_many("docs", vec![doc! { "_id": 5 }], no_context(&query))
            .await;
        assert!(matches!(duplicate, Err(DocumentStoreError::DocumentAlreadyExists(_, _))));
    }

    #[tokio::test]
    async fn update_reports_modified_by_value() {
        let store = InMemoryStore::new();
        let query = QueryOptions::default();
        store
            .insert_many("docs", vec![doc! { "_id": 1, "a": 1 }], no_context(&query))
            .await
            .unwrap();

        let same = store
            .update("docs", doc! { "_id": 1 }, NativeUpdate::Modify(doc! { "$set": { "a": 1 } }), false, no_context(&query))
            .await
            .unwrap();
        assert_eq!(same, UpdateOutcome { matched: 1, modified: 0 });

        let changed = store
            .update("docs", doc! { "_id": 1 }, NativeUpdate::Replace(doc! { "a": 2 }), false, no_context(&query))
            .await
            .unwrap();
        assert_eq!(changed, UpdateOutcome { matched: 1, modified: 1 });

        let stored = store.find("docs", FindSpec::default(), no_context(&query)).await.unwrap();
        assert_eq!(stored, vec![doc! { "_id": 1, "a": 2 }]);
    }

    #[tokio::test]
    async fn replacement_cannot_change_id() {
        let store = InMemoryStore::new();
        let query = QueryOptions::default();
        store
            .insert_many("docs", vec![doc! { "_id": 1 }], no_context(&query))
            .await
            .unwrap();

        let result = store
            .update("docs", doc! { "_id": 1 }, NativeUpdate::Replace(doc! { "_id": 2 }), false, no_context(&query))
            .await;

        assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn find_applies_sort_window_and_projection() {
        let store = InMemoryStore::new();
        let query = QueryOptions::default();
        let documents = (1..=5).map(|n| doc! { "_id": n, "n": n, "x": "y" }).collect();
        store.insert_many("docs", documents, no_context(&query)).await.unwrap();

        let spec = FindSpec::new(doc! { "n": { "$gt": 1 } })
            .with_sort(doc! { "n": -1 })
            .with_skip(1)
            .with_limit(2)
            .with_projection(doc! { "_id": 0, "n": 1 });
        let found = store.find("docs", spec, no_context(&query)).await.unwrap();

        assert_eq!(found, vec![doc! { "n": 4 }, doc! { "n": 3 }]);
    }

    #[tokio::test]
    async fn unique_index_is_enforced() {
        let store = InMemoryStore::new();
        let query = QueryOptions::default();
        store
            .create_index("docs", doc! { "email": 1 }, IndexOptions::default().unique(), no_context(&query))
            .await
            .unwrap();

        store
            .insert_many("docs", vec![doc! { "_id": 1, "email": "a" }], no_context(&query))
            .await
            .unwrap();
        let clash = store
            .insert_many("docs", vec![doc! { "_id": 2, "email": "a" }], no_context(&query))
            .await;

        assert!(clash.is_err());
    }

    #[tokio::test]
    async fn index_registry_is_idempotent_and_protects_id_index() {
        let store = InMemoryStore::new();
        let query = QueryOptions::default();

        let first = store
            .create_index("docs", doc! { "a": 1 }, IndexOptions::default(), no_context(&query))
            .await
            .unwrap();
        let second = store
            .create_index("docs", doc! { "a": 1 }, IndexOptions::default(), no_context(&query))
            .await
            .unwrap();
        assert_eq!(first, "a_1");
        assert_eq!(first, second);

        let renamed = store
            .create_index("docs", doc! { "a": 1 }, IndexOptions::default().with_name("by_a"), no_context(&query))
            .await
            .unwrap();
        assert_eq!(renamed, "by_a");
        store.drop_index("docs", "by_a", no_context(&query)).await.unwrap();

        let conflicting = store
            .create_index("docs", doc! { "b": 1 }, IndexOptions::default().with_name("a_1"), no_context(&query))
            .await;
        assert!(conflicting.is_err());

        assert_eq!(
            store.list_index_names("docs", no_context(&query)).await.unwrap(),
            vec!["_id_".to_string(), "a_1".to_string()]
        );
        assert!(store.drop_index("docs", "_id_", no_context(&query)).await.is_err());
        assert!(store.drop_index("docs", "missing", no_context(&query)).await.is_err());
    }

    #[tokio::test]
    async fn foreign_sessions_are_rejected() {
        let store = InMemoryStore::new();
        let other = InMemoryStore::new();
        let query = QueryOptions::default();

        let own = store.start_session().await.unwrap();
        let foreign = other.start_session().await.unwrap();
        let unrelated = SessionHandle::new(42_u32);

        assert!(store.count("docs", doc! {}, None, NativeContext::new(Some(&own), &query)).await.is_ok());
        assert!(matches!(
            store.count("docs", doc! {}, None, NativeContext::new(Some(&foreign), &query)).await,
            Err(DocumentStoreError::InvalidSession(_))
        ));
        assert!(matches!(
            store.count("docs", doc! {}, None, NativeContext::new(Some(&unrelated), &query)).await,
            Err(DocumentStoreError::InvalidSession(_))
        ));
    }

    #[tokio::test]
    async fn builder_creates_an_empty_store() {
        let store = InMemoryStore::builder().build().await.unwrap();

        assert!(store.collection_names().await.is_empty());
    }
}
