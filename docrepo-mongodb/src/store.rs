use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, TryStreamExt, stream};
use mongodb::{
    Client, ClientSession, Collection as MongoCollection, Database, IndexModel, SessionCursor,
    options::{
        AggregateOptions, ClientOptions, CountOptions, DeleteOptions, FindOptions, Hint as MongoHint,
        IndexOptions as MongoIndexOptions, InsertManyOptions, ReplaceOptions, UpdateOptions,
    },
};
use tracing::{debug, info};

use docrepo_core::{
    backend::{DocumentStream, FindSpec, NativeContext, StoreBackend, StoreBackendBuilder, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    options::IndexOptions,
    query::{Hint, QueryOptions},
    session::{SessionGuard, SessionHandle},
    translate::NativeUpdate,
};

fn backend_error(error: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(error.to_string())
}

fn native_hint(hint: &Hint) -> MongoHint {
    match hint {
        Hint::Name(name) => MongoHint::Name(name.clone()),
        Hint::Keys(keys) => MongoHint::Keys(keys.clone()),
    }
}

fn native_comment(query: &QueryOptions) -> Option<Bson> {
    query.comment.clone().map(Bson::String)
}

/// Locks the caller's session for the duration of one driver call.
async fn lock_session<'a>(ctx: &NativeContext<'a>) -> Option<SessionGuard<'a>> {
    match ctx.session {
        Some(handle) => Some(handle.lock().await),
        None => None,
    }
}

fn client_session<'g>(guard: &'g mut SessionGuard<'_>) -> DocumentStoreResult<&'g mut ClientSession> {
    guard.downcast_mut::<ClientSession>()
}

async fn drain(
    cursor: &mut SessionCursor<Document>,
    session: &mut ClientSession,
) -> DocumentStoreResult<Vec<Document>> {
    let mut documents = Vec::new();

    while let Some(document) = cursor.next(session).await {
        documents.push(document.map_err(backend_error)?);
    }

    Ok(documents)
}

async fn advance(cursor: &mut SessionCursor<Document>, handle: &SessionHandle) -> Option<DocumentStoreResult<Document>> {
    let mut guard = handle.lock().await;

    match client_session(&mut guard) {
        Ok(session) => cursor
            .next(session)
            .await
            .map(|document| document.map_err(backend_error)),
        Err(error) => Some(Err(error)),
    }
}

/// Streams a session cursor, locking the session for each advance.
fn session_stream(cursor: SessionCursor<Document>, handle: SessionHandle) -> DocumentStream {
    stream::unfold(Some((cursor, handle)), |state| async move {
        let (mut cursor, handle) = state?;
        let item = advance(&mut cursor, &handle).await?;
        let next = if item.is_ok() { Some((cursor, handle)) } else { None };

        Some((item, next))
    })
    .boxed()
}

/// MongoDB-backed document storage.
///
/// Every operation runs inside the caller's `ClientSession` when the call carries a session
/// handle started by [`StoreBackend::start_session`] on this store.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: Database,
}

impl MongoDbStore {
    pub fn new(client: Client, database: &str) -> Self {
        let database = client.database(database);
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    /// The underlying driver client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> MongoCollection<Document> {
        self.database.collection(name)
    }

    /// Starts a transaction on a session handle issued by this store.
    pub async fn start_transaction(&self, session: &SessionHandle) -> DocumentStoreResult<()> {
        let mut guard = session.lock().await;
        client_session(&mut guard)?
            .start_transaction()
            .await
            .map_err(backend_error)
    }

    /// Commits the transaction running on `session`.
    pub async fn commit_transaction(&self, session: &SessionHandle) -> DocumentStoreResult<()> {
        let mut guard = session.lock().await;
        client_session(&mut guard)?
            .commit_transaction()
            .await
            .map_err(backend_error)
    }

    /// Aborts the transaction running on `session`.
    pub async fn abort_transaction(&self, session: &SessionHandle) -> DocumentStoreResult<()> {
        let mut guard = session.lock().await;
        client_session(&mut guard)?
            .abort_transaction()
            .await
            .map_err(backend_error)
    }

    fn find_options(spec: &FindSpec, query: &QueryOptions) -> FindOptions {
        let mut options = FindOptions::default();

        options.sort = spec.sort.clone();
        options.skip = (spec.skip > 0).then_some(spec.skip);
        options.limit = spec.limit;
        options.projection = spec.projection.clone();
        options.hint = query.hint.as_ref().map(native_hint);
        options.comment = native_comment(query);
        options.max_time = query.max_time;

        options
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<()> {
        let mut options = InsertManyOptions::default();
        options.comment = native_comment(ctx.query);

        let target = self.collection(collection);
        let action = target.insert_many(documents).with_options(options);
        let mut guard = lock_session(&ctx).await;

        let result = match guard.as_mut() {
            Some(guard) => action.session(client_session(guard)?).await,
            None => action.await,
        };
        result.map_err(backend_error)?;

        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let options = Self::find_options(&spec, ctx.query);
        let target = self.collection(collection);
        let action = target.find(spec.filter).with_options(options);
        let mut guard = lock_session(&ctx).await;

        match guard.as_mut() {
            Some(guard) => {
                let session = client_session(guard)?;
                let mut cursor = action.session(&mut *session).await.map_err(backend_error)?;
                drain(&mut cursor, session).await
            }
            None => action
                .await
                .map_err(backend_error)?
                .try_collect()
                .await
                .map_err(backend_error),
        }
    }

    async fn find_stream(
        &self,
        collection: &str,
        spec: FindSpec,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<DocumentStream> {
        let options = Self::find_options(&spec, ctx.query);
        let target = self.collection(collection);
        let action = target.find(spec.filter).with_options(options);

        match ctx.session {
            Some(handle) => {
                let cursor = {
                    let mut guard = handle.lock().await;
                    action
                        .session(client_session(&mut guard)?)
                        .await
                        .map_err(backend_error)?
                };
                Ok(session_stream(cursor, handle.clone()))
            }
            None => Ok(action
                .await
                .map_err(backend_error)?
                .map(|document| document.map_err(backend_error))
                .boxed()),
        }
    }

    async fn count(
        &self,
        collection: &str,
        filter: Document,
        limit: Option<u64>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64> {
        let mut options = CountOptions::default();
        options.limit = limit;
        options.hint = ctx.query.hint.as_ref().map(native_hint);
        options.comment = native_comment(ctx.query);
        options.max_time = ctx.query.max_time;

        let target = self.collection(collection);
        let action = target.count_documents(filter).with_options(options);
        let mut guard = lock_session(&ctx).await;

        let result = match guard.as_mut() {
            Some(guard) => action.session(client_session(guard)?).await,
            None => action.await,
        };
        result.map_err(backend_error)
    }

    async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: NativeUpdate,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let target = self.collection(collection);
        let hint = ctx.query.hint.as_ref().map(native_hint);
        let comment = native_comment(ctx.query);
        let mut guard = lock_session(&ctx).await;
        let session = match guard.as_mut() {
            Some(guard) => Some(client_session(guard)?),
            None => None,
        };

        let result = match update {
            NativeUpdate::Replace(replacement) => {
                let mut options = ReplaceOptions::default();
                options.hint = hint;
                options.comment = comment;

                let action = target.replace_one(filter, replacement).with_options(options);
                match session {
                    Some(session) => action.session(session).await,
                    None => action.await,
                }
            }
            NativeUpdate::Modify(modifiers) => {
                let mut options = UpdateOptions::default();
                options.hint = hint;
                options.comment = comment;

                if multi {
                    let action = target.update_many(filter, modifiers).with_options(options);
                    match session {
                        Some(session) => action.session(session).await,
                        None => action.await,
                    }
                } else {
                    let action = target.update_one(filter, modifiers).with_options(options);
                    match session {
                        Some(session) => action.session(session).await,
                        None => action.await,
                    }
                }
            }
        }
        .map_err(backend_error)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete(
        &self,
        collection: &str,
        filter: Document,
        multi: bool,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<u64> {
        let target = self.collection(collection);
        let mut options = DeleteOptions::default();
        options.hint = ctx.query.hint.as_ref().map(native_hint);
        options.comment = native_comment(ctx.query);

        let mut guard = lock_session(&ctx).await;
        let session = match guard.as_mut() {
            Some(guard) => Some(client_session(guard)?),
            None => None,
        };

        let result = if multi {
            let action = target.delete_many(filter).with_options(options);
            match session {
                Some(session) => action.session(session).await,
                None => action.await,
            }
        } else {
            let action = target.delete_one(filter).with_options(options);
            match session {
                Some(session) => action.session(session).await,
                None => action.await,
            }
        }
        .map_err(backend_error)?;

        Ok(result.deleted_count)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut options = AggregateOptions::default();
        options.hint = ctx.query.hint.as_ref().map(native_hint);
        options.comment = native_comment(ctx.query);
        options.max_time = ctx.query.max_time;

        let target = self.collection(collection);
        let action = target.aggregate(pipeline).with_options(options);
        let mut guard = lock_session(&ctx).await;

        match guard.as_mut() {
            Some(guard) => {
                let session = client_session(guard)?;
                let mut cursor = action.session(&mut *session).await.map_err(backend_error)?;
                drain(&mut cursor, session).await
            }
            None => action
                .await
                .map_err(backend_error)?
                .try_collect()
                .await
                .map_err(backend_error),
        }
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: IndexOptions,
        ctx: NativeContext<'_>,
    ) -> DocumentStoreResult<String> {
        let mut native = MongoIndexOptions::default();
        native.name = options.name;
        native.unique = options.unique.then_some(true);
        native.sparse = options.sparse.then_some(true);
        native.expire_after = options.expire_after;
        native.weights = options.weights;

        let model = IndexModel::builder().keys(keys).options(native).build();
        let target = self.collection(collection);
        let action = target.create_index(model);
        let mut guard = lock_session(&ctx).await;

        let created = match guard.as_mut() {
            Some(guard) => action.session(client_session(guard)?).await,
            None => action.await,
        }
        .map_err(backend_error)?;

        debug!(target: "docrepo::mongodb", collection, index = %created.index_name, "index created");

        Ok(created.index_name)
    }

    async fn drop_index(&self, collection: &str, name: &str, ctx: NativeContext<'_>) -> DocumentStoreResult<()> {
        let target = self.collection(collection);
        let action = target.drop_index(name);
        let mut guard = lock_session(&ctx).await;

        let result = match guard.as_mut() {
            Some(guard) => action.session(client_session(guard)?).await,
            None => action.await,
        };
        result.map_err(backend_error)
    }

    async fn list_index_names(&self, collection: &str, ctx: NativeContext<'_>) -> DocumentStoreResult<Vec<String>> {
        let target = self.collection(collection);
        let action = target.list_index_names();
        let mut guard = lock_session(&ctx).await;

        let result = match guard.as_mut() {
            Some(guard) => action.session(client_session(guard)?).await,
            None => action.await,
        };
        result.map_err(backend_error)
    }

    async fn start_session(&self) -> DocumentStoreResult<SessionHandle> {
        let session = self.client.start_session().await.map_err(backend_error)?;
        debug!(target: "docrepo::mongodb", database = %self.database.name(), "session started");

        Ok(SessionHandle::new(session))
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;
        info!(target: "docrepo::mongodb", "client shut down");

        Ok(())
    }
}

/// Builder for [`MongoDbStore`]. The connection string and database name are opaque.
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
    app_name: Option<String>,
    min_pool_size: Option<u32>,
    max_pool_size: Option<u32>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            app_name: None,
            min_pool_size: None,
            max_pool_size: None,
        }
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn with_min_pool_size(mut self, size: u32) -> Self {
        self.min_pool_size = Some(size);
        self
    }

    pub fn with_max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = Some(size);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if self.app_name.is_some() {
            options.app_name = self.app_name;
        }
        if self.min_pool_size.is_some() {
            options.min_pool_size = self.min_pool_size;
        }
        if self.max_pool_size.is_some() {
            options.max_pool_size = self.max_pool_size;
        }

        let client = Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        info!(target: "docrepo::mongodb", database = %self.database, "connected");

        Ok(MongoDbStore::new(client, &self.database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use std::time::Duration;

    #[test]
    fn find_options_carry_the_native_query_options() {
        let spec = FindSpec::new(doc! {})
            .with_sort(doc! { "a": 1 })
            .with_skip(10)
            .with_limit(5)
            .with_projection(doc! { "a": 1 });
        let query = QueryOptions {
            hint: Some(Hint::Name("a_1".to_string())),
            comment: Some("report".to_string()),
            max_time: Some(Duration::from_secs(2)),
        };

        let options = MongoDbStore::find_options(&spec, &query);

        assert_eq!(options.sort, Some(doc! { "a": 1 }));
        assert_eq!(options.skip, Some(10));
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.comment, Some(Bson::String("report".to_string())));
        assert_eq!(options.max_time, Some(Duration::from_secs(2)));
        assert!(matches!(options.hint, Some(MongoHint::Name(ref name)) if name == "a_1"));
    }

    #[test]
    fn zero_skip_is_left_unset() {
        let options = MongoDbStore::find_options(&FindSpec::new(doc! {}), &QueryOptions::default());

        assert_eq!(options.skip, None);
        assert_eq!(options.limit, None);
    }
}
