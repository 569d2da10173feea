mod common;

use common::{TestDocument, repository};
use docrepo::{bson::doc, memory::InMemoryStore, prelude::*};
use futures::StreamExt;
use serde::Deserialize;

async fn seeded() -> Repository<InMemoryStore> {
    let (repository, _) = repository();
    let documents = vec![
        TestDocument::new("c", "X", 3),
        TestDocument::new("a", "X", 1),
        TestDocument::new("e", "Y", 5),
        TestDocument::new("b", "Y", 2),
        TestDocument::new("d", "X", 4),
    ];
    repository.add_many(&documents, &Options::default()).await.unwrap();
    repository
}

fn values(documents: &[TestDocument]) -> Vec<i32> {
    documents.iter().map(|document| document.some_value).collect()
}

#[tokio::test]
async fn sorted_pagination_takes_a_window() {
    let repository = seeded().await;

    let first_two = repository
        .get_sorted_paginated::<TestDocument>(
            Criteria::All,
            &PageRequest::new().sorted_by(Sort::asc("SomeValue")).take(2),
            &Options::default(),
        )
        .await
        .unwrap();
    let last_two = repository
        .get_sorted_paginated::<TestDocument>(
            Criteria::All,
            &PageRequest::new().sorted_by(Sort::desc("Nested.SomeValue")).take(2),
            &Options::default(),
        )
        .await
        .unwrap();
    let nothing = repository
        .get_sorted_paginated::<TestDocument>(Criteria::All, &PageRequest::new().take(0), &Options::default())
        .await
        .unwrap();

    assert_eq!(values(&first_two), vec![1, 2]);
    assert_eq!(values(&last_two), vec![5, 4]);
    assert!(nothing.is_empty());
}

#[tokio::test]
async fn pages_carry_count_and_navigation() {
    let repository = seeded().await;

    let middle = repository
        .get_paginated::<TestDocument>(Criteria::All, &PageRequest::page(2, 2), &Options::default())
        .await
        .unwrap();
    let last = repository
        .get_paginated::<TestDocument>(Criteria::All, &PageRequest::page(3, 2), &Options::default())
        .await
        .unwrap();

    // Unsorted requests fall back to key order.
    assert_eq!(values(&middle.items), vec![3, 4]);
    assert_eq!(middle.count, 5);
    assert_eq!(middle.next_page, Some(3));
    assert_eq!(middle.previous_page, Some(1));
    assert_eq!(values(&last.items), vec![5]);
    assert_eq!(last.next_page, None);
}

#[tokio::test]
async fn extremes_by_field() {
    let repository = seeded().await;
    let options = Options::default();

    let smallest = repository
        .get_by_min::<TestDocument>(Filter::eq("SomeContent", "Y"), "SomeValue", &options)
        .await
        .unwrap();
    let largest = repository
        .get_by_max::<TestDocument>(Criteria::All, "Nested.SomeValue", &options)
        .await
        .unwrap();
    let min_value = repository
        .get_min_value::<TestDocument, i32>(Filter::eq("SomeContent", "X"), "SomeValue", &options)
        .await
        .unwrap();
    let max_value = repository
        .get_max_value::<TestDocument, i32>(Criteria::All, "Nested.SomeValue", &options)
        .await
        .unwrap();
    let no_match = repository
        .get_max_value::<TestDocument, i32>(Filter::eq("SomeContent", "Z"), "SomeValue", &options)
        .await
        .unwrap();

    assert_eq!(smallest.map(|document| document.id), Some("b".to_string()));
    assert_eq!(largest.map(|document| document.id), Some("e".to_string()));
    assert_eq!(min_value, Some(1));
    assert_eq!(max_value, Some(50));
    assert_eq!(no_match, None);
}

#[derive(Debug, Deserialize, PartialEq)]
struct Summary {
    #[serde(rename = "SomeContent")]
    content: String,
    #[serde(rename = "When")]
    when: String,
}

#[tokio::test]
async fn projections_reshape_documents() {
    let repository = seeded().await;
    let projection = Projection::new()
        .include("SomeContent")
        .alias("When", "Nested.SomeDate")
        .without_id();

    let one = repository
        .project_one::<TestDocument, Summary>(Filter::eq("Id", "e"), &projection, &Options::default())
        .await
        .unwrap();
    let many = repository
        .project_many::<TestDocument, Summary>(Filter::eq("SomeContent", "X"), &projection, &Options::default())
        .await
        .unwrap();
    let raw = repository
        .project_one::<TestDocument, docrepo::bson::Document>(
            Filter::eq("Id", "a"),
            &Projection::new().include("SomeValue").without_id(),
            &Options::default(),
        )
        .await
        .unwrap();

    assert_eq!(
        one,
        Some(Summary { content: "Y".to_string(), when: "2024-01-01".to_string() })
    );
    assert_eq!(many.len(), 3);
    assert_eq!(raw, Some(doc! { "SomeValue": 1 }));
}

#[derive(Debug, Deserialize, PartialEq)]
struct ContentGroup {
    #[serde(rename = "_id")]
    content: String,
    #[serde(rename = "Count")]
    count: i64,
    #[serde(rename = "Total")]
    total: i64,
}

#[tokio::test]
async fn group_by_accumulates_per_key() {
    let repository = seeded().await;
    let grouping = Grouping::by("SomeContent").count("Count").sum("Total", "SomeValue");

    let groups = repository
        .group_by::<TestDocument, ContentGroup>(Criteria::All, &grouping, &Options::default())
        .await
        .unwrap();

    assert_eq!(
        groups,
        vec![
            ContentGroup { content: "X".to_string(), count: 3, total: 8 },
            ContentGroup { content: "Y".to_string(), count: 2, total: 7 },
        ]
    );
}

#[tokio::test]
async fn sum_by_defaults_to_zero() {
    let repository = seeded().await;

    let total = repository
        .sum_by::<TestDocument, i64>(Filter::eq("SomeContent", "X"), "Nested.SomeValue", &Options::default())
        .await
        .unwrap();
    let empty = repository
        .sum_by::<TestDocument, i64>(Filter::eq("SomeContent", "Z"), "SomeValue", &Options::default())
        .await
        .unwrap();

    assert_eq!(total, 80);
    assert_eq!(empty, 0);
}

#[tokio::test]
async fn cursor_streams_every_match() {
    let repository = seeded().await;

    let cursor = repository
        .get_cursor::<TestDocument>(Filter::gte("SomeValue", 3), &Options::default())
        .await
        .unwrap();
    let mut found: Vec<i32> = cursor
        .map(|result| result.unwrap().some_value)
        .collect()
        .await;
    found.sort();

    assert_eq!(found, vec![3, 4, 5]);
}

#[tokio::test]
async fn typed_and_native_criteria_agree() {
    let repository = seeded().await;

    let typed = repository
        .get_all::<TestDocument>(
            Field::new("SomeContent").eq("X").and(Field::new("SomeValue").gt(1)),
            &Options::default(),
        )
        .await
        .unwrap();
    let native = repository
        .get_all::<TestDocument>(
            doc! { "SomeContent": "X", "SomeValue": { "$gt": 1 } },
            &Options::default(),
        )
        .await
        .unwrap();
    let either = repository
        .count::<TestDocument>(
            Filter::or([Filter::eq("Id", "a"), Filter::any_of("Id", ["d", "e"])]),
            &Options::default(),
        )
        .await
        .unwrap();
    let negated = repository
        .get_one::<TestDocument>(
            Filter::not(Filter::lt("SomeValue", 5)),
            &Options::default(),
        )
        .await
        .unwrap();

    let mut typed = values(&typed);
    typed.sort();
    let mut native = values(&native);
    native.sort();
    assert_eq!(typed, vec![3, 4]);
    assert_eq!(typed, native);
    assert_eq!(either, 3);
    assert_eq!(negated.map(|document| document.some_value), Some(5));
}

#[tokio::test]
async fn contains_matches_substrings() {
    let (repository, _) = repository();
    let documents = vec![
        TestDocument::new("1", "hello world", 1),
        TestDocument::new("2", "goodbye", 2),
    ];
    repository.add_many(&documents, &Options::default()).await.unwrap();

    let found = repository
        .get_all::<TestDocument>(Filter::contains("SomeContent", "world"), &Options::default())
        .await
        .unwrap();
    let starts = repository
        .any::<TestDocument>(Filter::starts_with("SomeContent", "good"), &Options::default())
        .await
        .unwrap();

    assert_eq!(values(&found), vec![1]);
    assert!(starts);
}
