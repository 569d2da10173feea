mod common;

use common::{TestDocument, repository};
use docrepo::{
    memory::{ID_INDEX_NAME, InMemoryStore},
    prelude::*,
};
use futures::StreamExt;

#[tokio::test]
async fn index_lifecycle() {
    let (repository, _) = repository();
    let options = Options::new().with_partition_key("p");
    repository
        .add_one(&TestDocument::new("a", "X", 1).in_partition("p"), &Options::default())
        .await
        .unwrap();

    let first = repository
        .create_ascending_index::<TestDocument>("SomeValue", IndexOptions::default(), &options)
        .await
        .unwrap();
    let again = repository
        .create_ascending_index::<TestDocument>("SomeValue", IndexOptions::default(), &options)
        .await
        .unwrap();
    let descending = repository
        .create_descending_index::<TestDocument>("Nested.SomeValue", IndexOptions::default(), &options)
        .await
        .unwrap();

    assert_eq!(first, "SomeValue_1");
    assert_eq!(again, first);
    assert_eq!(descending, "Nested.SomeValue_-1");
    assert_eq!(
        repository.get_index_names::<TestDocument>(&options).await.unwrap(),
        vec![ID_INDEX_NAME, "SomeValue_1", "Nested.SomeValue_-1"]
    );

    repository.drop_index::<TestDocument>(&first, &options).await.unwrap();
    assert_eq!(
        repository.get_index_names::<TestDocument>(&options).await.unwrap(),
        vec![ID_INDEX_NAME, "Nested.SomeValue_-1"]
    );
    assert!(repository.drop_index::<TestDocument>(ID_INDEX_NAME, &options).await.is_err());
    assert!(
        repository
            .get_index_names::<TestDocument>(&Options::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn same_keys_under_another_name_is_a_second_index() {
    let (repository, _) = repository();
    let options = Options::default();

    let default_name = repository
        .create_ascending_index::<TestDocument>("SomeValue", IndexOptions::default(), &options)
        .await
        .unwrap();
    let explicit_name = repository
        .create_ascending_index::<TestDocument>("SomeValue", IndexOptions::default().with_name("by_value"), &options)
        .await
        .unwrap();

    assert_eq!(default_name, "SomeValue_1");
    assert_eq!(explicit_name, "by_value");
    assert_eq!(
        repository.get_index_names::<TestDocument>(&options).await.unwrap(),
        vec![ID_INDEX_NAME, "SomeValue_1", "by_value"]
    );
}

#[tokio::test]
async fn text_indexes_are_named_after_their_fields() {
    let (repository, _) = repository();

    let single = repository
        .create_text_index::<TestDocument>("SomeContent", IndexOptions::default(), &Options::default())
        .await
        .unwrap();
    let named = repository
        .create_combined_text_index::<TestDocument>(
            &["SomeContent", "Nested.SomeDate"],
            IndexOptions::default().with_name("search"),
            &Options::default(),
        )
        .await
        .unwrap();
    let empty = repository
        .create_combined_text_index::<TestDocument>(&[], IndexOptions::default(), &Options::default())
        .await;

    assert_eq!(single, "SomeContent_text");
    assert_eq!(named, "search");
    assert!(matches!(empty, Err(DocumentStoreError::InvalidQuery(_))));
}

#[tokio::test]
async fn unique_indexes_reject_duplicates() {
    let (repository, _) = repository();
    repository
        .create_ascending_index::<TestDocument>("SomeContent", IndexOptions::default().unique(), &Options::default())
        .await
        .unwrap();

    repository
        .add_one(&TestDocument::new("a", "X", 1), &Options::default())
        .await
        .unwrap();
    let clash = repository
        .add_one(&TestDocument::new("b", "X", 2), &Options::default())
        .await;

    assert!(matches!(clash, Err(DocumentStoreError::DocumentAlreadyExists(_, _))));
}

#[tokio::test]
async fn sessions_are_bound_to_their_store() {
    let (repository, _) = repository();
    let session = repository.start_session().await.unwrap();
    let options = Options::new().with_session(session.clone());

    repository
        .add_one(&TestDocument::new("a", "X", 1), &options)
        .await
        .unwrap();
    let found = repository
        .get_by_id::<TestDocument>(&"a".to_string(), &options)
        .await
        .unwrap();
    assert!(found.is_some());

    let (other, _) = common::repository();
    let foreign = other
        .count::<TestDocument>(Criteria::All, &options)
        .await;
    assert!(matches!(foreign, Err(DocumentStoreError::InvalidSession(_))));
}

#[tokio::test]
async fn cancelled_operations_fail_without_side_effects() {
    let (repository, _) = repository();
    let token = CancellationToken::new();
    token.cancel();
    let options = Options::new().with_cancellation(token);

    let error = repository
        .add_one(&TestDocument::new("a", "X", 1), &options)
        .await
        .unwrap_err();

    assert!(error.is_cancelled());
    assert_eq!(
        repository.count::<TestDocument>(Criteria::All, &Options::default()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn cursor_stops_once_cancelled() {
    let (repository, _) = repository();
    let documents: Vec<TestDocument> = (1..=3).map(|n| TestDocument::new(&n.to_string(), "X", n)).collect();
    repository.add_many(&documents, &Options::default()).await.unwrap();

    let token = CancellationToken::new();
    let mut cursor = repository
        .get_cursor::<TestDocument>(Criteria::All, &Options::new().with_cancellation(token.clone()))
        .await
        .unwrap();

    assert!(cursor.next().await.unwrap().is_ok());
    token.cancel();
    assert!(matches!(cursor.next().await, Some(Err(DocumentStoreError::Cancelled))));
    assert!(cursor.next().await.is_none());
}

#[tokio::test]
async fn read_only_view_sees_writes() {
    let (repository, store) = repository();
    repository
        .add_one(&TestDocument::new("a", "X", 1), &Options::default())
        .await
        .unwrap();

    let view = ReadOnlyRepository::new(store);
    let borrowed = repository.read_only();

    assert_eq!(view.count::<TestDocument>(Criteria::All, &Options::default()).await.unwrap(), 1);
    assert!(borrowed.any::<TestDocument>(Filter::eq("Id", "a"), &Options::default()).await.unwrap());

    let owned = repository.into_read_only();
    assert_eq!(
        owned
            .get_all::<TestDocument>(Criteria::All, &Options::default())
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn repositories_work_over_boxed_backends() {
    let backend: Box<dyn DynStoreBackend> = Box::new(InMemoryStore::new());
    let repository = Repository::new(backend);

    repository
        .add_one(&TestDocument::new("a", "X", 1), &Options::default())
        .await
        .unwrap();
    let updated = repository
        .update_one_field::<TestDocument>(Filter::eq("Id", "a"), "SomeValue", 2, &Options::default())
        .await
        .unwrap();

    assert!(updated);
    assert_eq!(
        repository
            .get_max_value::<TestDocument, i32>(Criteria::All, "SomeValue", &Options::default())
            .await
            .unwrap(),
        Some(2)
    );
    repository.shutdown().await.unwrap();
}

#[test]
fn blocking_repository_runs_to_completion() {
    let repository = BlockingRepository::connect(InMemoryStore::builder()).unwrap();
    let documents: Vec<TestDocument> = (1..=4).map(|n| TestDocument::new(&n.to_string(), "X", n)).collect();

    repository.add_many(&documents, &Options::default()).unwrap();
    let deleted = repository
        .delete_many::<TestDocument>(Filter::lte("SomeValue", 2), &Options::default())
        .unwrap();
    let remaining: Vec<i32> = repository
        .get_cursor::<TestDocument>(Criteria::All, &Options::default())
        .unwrap()
        .map(|result| result.unwrap().some_value)
        .collect();

    assert_eq!(deleted, 2);
    assert_eq!(remaining, vec![3, 4]);
    repository.shutdown().unwrap();
}
