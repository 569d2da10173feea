mod common;

use common::{LedgerEntry, TestDocument, repository};
use docrepo::{
    bson::doc,
    prelude::*,
    resolver::{CollectionDescriptor, resolve},
};

#[tokio::test]
async fn added_document_round_trips_by_id() {
    let (repository, _) = repository();
    let document = TestDocument::new("a", "X", 1);

    repository.add_one(&document, &Options::default()).await.unwrap();
    let found = repository
        .get_by_id::<TestDocument>(&document.id, &Options::default())
        .await
        .unwrap();

    assert_eq!(found, Some(document));
}

#[tokio::test]
async fn partitions_are_isolated() {
    let (repository, store) = repository();
    let first = TestDocument::new("same", "X", 1).in_partition("k1");
    let second = TestDocument::new("same", "Y", 2).in_partition("k2");

    repository.add_one(&first, &Options::default()).await.unwrap();
    repository.add_one(&second, &Options::default()).await.unwrap();

    let in_k1 = repository
        .get_by_id::<TestDocument>(&"same".to_string(), &Options::new().with_partition_key("k1"))
        .await
        .unwrap();
    let in_k3 = repository
        .get_by_id::<TestDocument>(&"same".to_string(), &Options::new().with_partition_key("k3"))
        .await
        .unwrap();
    let unpartitioned = repository
        .get_by_id::<TestDocument>(&"same".to_string(), &Options::default())
        .await
        .unwrap();

    assert_eq!(in_k1, Some(first));
    assert_eq!(in_k3, None);
    assert_eq!(unpartitioned, None);
    assert_eq!(store.collection_names().await, vec!["k1-testDocuments", "k2-testDocuments"]);
}

#[test]
fn resolution_is_idempotent_and_ignores_empty_partition() {
    let descriptor = CollectionDescriptor::of::<TestDocument>();

    assert_eq!(resolve(&descriptor, Some("p")), resolve(&descriptor, Some("p")));
    assert_eq!(resolve(&descriptor, Some("")), resolve(&descriptor, None));
    assert_eq!(resolve(&CollectionDescriptor::of::<LedgerEntry>(), Some("p")), "p-ledger");
}

#[tokio::test]
async fn add_many_groups_documents_by_their_own_partition() {
    let (repository, store) = repository();
    let documents = vec![
        TestDocument::new("1", "X", 1).in_partition("a"),
        TestDocument::new("2", "X", 2),
        TestDocument::new("3", "X", 3).in_partition("b"),
        TestDocument::new("4", "X", 4).in_partition("a"),
    ];

    repository
        .add_many(&documents, &Options::new().with_partition_key("fallback"))
        .await
        .unwrap();

    assert_eq!(
        store.collection_names().await,
        vec!["a-testDocuments", "b-testDocuments", "fallback-testDocuments"]
    );
    let in_a = repository
        .count::<TestDocument>(Criteria::All, &Options::new().with_partition_key("a"))
        .await
        .unwrap();
    assert_eq!(in_a, 2);
}

#[tokio::test]
async fn add_many_with_no_documents_is_a_no_op() {
    let (repository, store) = repository();

    repository
        .add_many::<TestDocument>(&[], &Options::default())
        .await
        .unwrap();

    assert!(store.collection_names().await.is_empty());
}

#[tokio::test]
async fn adding_an_existing_key_fails() {
    let (repository, _) = repository();
    let document = TestDocument::new("dup", "X", 1);

    repository.add_one(&document, &Options::default()).await.unwrap();
    let second = repository.add_one(&document, &Options::default()).await;

    assert!(matches!(second, Err(DocumentStoreError::DocumentAlreadyExists(_, _))));
}

#[tokio::test]
async fn count_then_delete_many_by_content() {
    let (repository, _) = repository();
    let mut documents: Vec<TestDocument> = (0..5)
        .map(|n| TestDocument::new(&format!("x{n}"), "X", n))
        .collect();
    documents.push(TestDocument::new("y0", "Y", 10));
    documents.push(TestDocument::new("y1", "Z", 11));
    repository.add_many(&documents, &Options::default()).await.unwrap();

    let is_x = || Filter::eq("SomeContent", "X");

    assert_eq!(repository.count::<TestDocument>(is_x(), &Options::default()).await.unwrap(), 5);
    assert_eq!(repository.delete_many::<TestDocument>(is_x(), &Options::default()).await.unwrap(), 5);
    assert_eq!(repository.count::<TestDocument>(is_x(), &Options::default()).await.unwrap(), 0);
    assert!(!repository.any::<TestDocument>(is_x(), &Options::default()).await.unwrap());
    assert_eq!(repository.count::<TestDocument>(Criteria::All, &Options::default()).await.unwrap(), 2);
}

#[tokio::test]
async fn update_reports_only_real_modifications() {
    let (repository, _) = repository();
    let document = TestDocument::new("u", "X", 1);
    repository.add_one(&document, &Options::default()).await.unwrap();

    let unchanged = repository
        .update_one_field::<TestDocument>(Filter::eq("Id", "u"), "SomeContent", "X", &Options::default())
        .await
        .unwrap();
    let changed = repository
        .update_one_field::<TestDocument>(Filter::eq("Id", "u"), "SomeContent", "Y", &Options::default())
        .await
        .unwrap();
    let unmatched = repository
        .update_one_field::<TestDocument>(Filter::eq("Id", "missing"), "SomeContent", "Y", &Options::default())
        .await
        .unwrap();

    assert!(!unchanged);
    assert!(changed);
    assert!(!unmatched);
}

#[tokio::test]
async fn replacing_a_document_keeps_its_key() {
    let (repository, _) = repository();
    let mut document = TestDocument::new("r", "X", 1).in_partition("p");
    repository.add_one(&document, &Options::default()).await.unwrap();

    document.some_value = 42;
    assert!(repository.update_one(&document, &Options::default()).await.unwrap());
    assert!(!repository.update_one(&document, &Options::default()).await.unwrap());

    let stored = repository
        .get_by_id::<TestDocument>(&document.id, &Options::new().with_partition_key("p"))
        .await
        .unwrap();
    assert_eq!(stored, Some(document));
}

#[tokio::test]
async fn nested_fields_can_be_set_by_path() {
    let (repository, _) = repository();
    let document = TestDocument::new("n", "X", 1);
    repository.add_one(&document, &Options::default()).await.unwrap();

    let updated = repository
        .update_one_field::<TestDocument>(Filter::eq("Id", "n"), "Nested.SomeDate", "2030-12-31", &Options::default())
        .await
        .unwrap();
    let stored = repository
        .get_by_id::<TestDocument>(&document.id, &Options::default())
        .await
        .unwrap()
        .unwrap();

    assert!(updated);
    assert_eq!(stored.nested.some_date, "2030-12-31");
    assert_eq!(stored.nested.some_value, 10);
}

#[tokio::test]
async fn update_definitions_apply_to_one_or_many() {
    let (repository, _) = repository();
    let documents: Vec<TestDocument> = (1..=3).map(|n| TestDocument::new(&n.to_string(), "X", n)).collect();
    repository.add_many(&documents, &Options::default()).await.unwrap();

    let bumped = repository
        .update_one_by(&documents[0], UpdateDefinition::new().inc("SomeValue", 100), &Options::default())
        .await
        .unwrap();
    assert!(bumped);

    let modified = repository
        .update_many::<TestDocument>(
            Filter::gt("SomeValue", 1),
            UpdateDefinition::new().set("SomeContent", "big"),
            &Options::default(),
        )
        .await
        .unwrap();
    assert_eq!(modified, 3);

    let renamed = repository
        .update_many_field::<TestDocument>(Criteria::All, "SomeContent", "big", &Options::default())
        .await
        .unwrap();
    assert_eq!(renamed, 0);

    let first = repository
        .get_by_id::<TestDocument>(&"1".to_string(), &Options::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.some_value, 101);
}

#[tokio::test]
async fn replacing_many_documents_is_rejected() {
    let (repository, _) = repository();

    let result = repository
        .update_many::<TestDocument>(Criteria::All, Update::Replace(doc! { "SomeContent": "X" }), &Options::default())
        .await;

    assert!(matches!(result, Err(DocumentStoreError::InvalidQuery(_))));
}

#[tokio::test]
async fn deletes_report_counts() {
    let (repository, _) = repository();
    let documents = vec![
        TestDocument::new("1", "X", 1).in_partition("a"),
        TestDocument::new("2", "X", 2).in_partition("b"),
        TestDocument::new("3", "X", 3).in_partition("b"),
        TestDocument::new("4", "X", 4),
    ];
    repository.add_many(&documents, &Options::default()).await.unwrap();

    assert_eq!(repository.delete_one(&documents[3], &Options::default()).await.unwrap(), 1);
    assert_eq!(repository.delete_one(&documents[3], &Options::default()).await.unwrap(), 0);

    let removed = repository
        .delete_many_documents(&documents[..3], &Options::default())
        .await
        .unwrap();
    assert_eq!(removed, 3);

    let remaining = repository
        .delete_one_where::<TestDocument>(Criteria::All, &Options::new().with_partition_key("b"))
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn explicit_collection_and_key_field() {
    let (repository, store) = repository();
    let entry = LedgerEntry { number: 7, amount: 12.5 };

    repository.add_one(&entry, &Options::default()).await.unwrap();

    assert_eq!(store.collection_names().await, vec!["ledger"]);
    assert_eq!(
        repository.get_by_id::<LedgerEntry>(&7, &Options::default()).await.unwrap(),
        Some(entry)
    );
}
