//! Core traits and types for document representation and serialization.
//!
//! This module provides the fundamental traits that all stored documents must implement,
//! as well as utilities for converting documents to and from their native BSON form.

use bson::{Bson, Document as BsonDocument, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};
use std::fmt::Debug;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Name of the native field every document's key is stored under.
pub const ID_FIELD: &str = "_id";

/// Capability of a document key: comparable for equality and convertible to a native value.
///
/// Implemented for every type satisfying the bounds, which covers `bson::Uuid`,
/// `bson::oid::ObjectId`, `String`, `i32` and `i64`.
pub trait DocumentKey: Clone + PartialEq + Debug + Send + Sync + Into<Bson> + 'static {}

impl<K> DocumentKey for K where K: Clone + PartialEq + Debug + Send + Sync + Into<Bson> + 'static {}

/// Core trait that all documents stored through a repository must implement.
///
/// The key type is an associated type, so repository calls infer it from the document type.
/// Documents may opt into partitioning by returning a partition key; the key selects which
/// physical collection variant the document lives in.
///
/// `#[derive(Document)]` from the facade crate implements this trait from field attributes.
///
/// # Example
///
/// ```ignore
/// use docrepo::document::Document;
/// use bson::Uuid;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     pub id: Uuid,
///     pub name: String,
/// }
///
/// impl Document for User {
///     type Key = Uuid;
///
///     fn id(&self) -> &Uuid {
///         &self.id
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// The type of this document's identifier.
    type Key: DocumentKey;

    /// Returns a reference to this document's unique identifier.
    fn id(&self) -> &Self::Key;

    /// Returns an explicit collection name, replacing the naming convention.
    fn collection_name_override() -> Option<&'static str> {
        None
    }

    /// Returns the partition key of this document, if it is partitioned.
    fn partition_key(&self) -> Option<&str> {
        None
    }
}

/// Extension trait providing native conversion utilities for documents.
///
/// This trait is automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Converts this document to its stored form: the serialized body plus `_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the type does not serialize to a document.
    fn to_native(&self) -> DocumentStoreResult<BsonDocument>;

    /// Creates a document from its stored form.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the structure is invalid.
    fn from_native(document: BsonDocument) -> DocumentStoreResult<Self>;

    /// Returns the native value of this document's key.
    fn native_id(&self) -> Bson {
        self.id().clone().into()
    }

    /// Converts this document to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Creates a document from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the structure is invalid.
    fn from_json(value: Value) -> DocumentStoreResult<Self>;
}

impl<D: Document> DocumentExt for D {
    fn to_native(&self) -> DocumentStoreResult<BsonDocument> {
        let mut document = to_document(self)?;
        document.insert(ID_FIELD, self.native_id());

        Ok(document)
    }

    fn from_native(document: BsonDocument) -> DocumentStoreResult<Self> {
        from_document(document)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocumentStoreResult<Self> {
        Ok(from_value(value)?)
    }
}

/// Serializes any value that maps to a BSON document.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> DocumentStoreResult<BsonDocument> {
    match serialize_to_bson(value)? {
        Bson::Document(document) => Ok(document),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "expected a document, got {:?}",
            other.element_type()
        ))),
    }
}

/// Deserializes any value from a BSON document.
pub fn from_document<T: DeserializeOwned>(document: BsonDocument) -> DocumentStoreResult<T> {
    Ok(deserialize_from_bson(Bson::Document(document))?)
}

/// Deserializes any value from a BSON value.
pub fn from_bson<T: DeserializeOwned>(value: Bson) -> DocumentStoreResult<T> {
    Ok(deserialize_from_bson(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        number: i64,
        owner: String,
    }

    impl Document for Account {
        type Key = i64;

        fn id(&self) -> &i64 {
            &self.number
        }
    }

    #[test]
    fn stored_form_carries_the_key() {
        let account = Account { number: 7, owner: "ada".to_string() };

        let native = account.to_native().unwrap();

        assert_eq!(native, doc! { "number": 7_i64, "owner": "ada", "_id": 7_i64 });
        assert_eq!(Account::from_native(native).unwrap(), account);
    }

    #[test]
    fn scalars_are_not_documents() {
        assert!(matches!(to_document(&5), Err(DocumentStoreError::InvalidDocument(_))));
    }

    #[test]
    fn json_conversion() {
        let account = Account { number: 1, owner: "bo".to_string() };

        let value = account.to_json().unwrap();

        assert_eq!(value["owner"], "bo");
        assert_eq!(Account::from_json(value).unwrap(), account);
    }
}
