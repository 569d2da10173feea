#![allow(dead_code)]

use docrepo::{Document, memory::InMemoryStore, prelude::Repository};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Nested {
    pub some_date: String,
    pub some_value: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[serde(rename_all = "PascalCase")]
pub struct TestDocument {
    pub id: String,
    pub some_content: String,
    pub some_value: i32,
    pub nested: Nested,
    #[document(partition_key)]
    pub partition_key: Option<String>,
}

impl TestDocument {
    pub fn new(id: &str, content: &str, value: i32) -> Self {
        Self {
            id: id.to_string(),
            some_content: content.to_string(),
            some_value: value,
            nested: Nested {
                some_date: "2024-01-01".to_string(),
                some_value: value * 10,
            },
            partition_key: None,
        }
    }

    pub fn in_partition(mut self, partition: &str) -> Self {
        self.partition_key = Some(partition.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "ledger")]
pub struct LedgerEntry {
    #[document(id)]
    pub number: i64,
    pub amount: f64,
}

pub fn repository() -> (Repository<InMemoryStore>, InMemoryStore) {
    let store = InMemoryStore::new();
    (Repository::new(store.clone()), store)
}
