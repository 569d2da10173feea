//! Update specifications.
//!
//! An update is one of three forms, all translated into a single native instruction:
//! a full replacement document, a single field set to a new value, or a native update
//! document (built by hand or with [`UpdateDefinition`]).

use bson::{Bson, Document, doc};

/// The mutation part of an update operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Replace the whole stored document. The stored `_id` is preserved.
    Replace(Document),
    /// Set a single (possibly nested) field to a value.
    Set {
        /// Dotted path of the field.
        field: String,
        /// The new value.
        value: Bson,
    },
    /// A native update document (`{"$set": {...}, "$inc": {...}}`), passed through unchanged.
    Native(Document),
}

impl Update {
    /// Sets a single field to a value.
    pub fn set(field: impl Into<String>, value: impl Into<Bson>) -> Self {
        Update::Set { field: field.into(), value: value.into() }
    }
}

impl From<Document> for Update {
    fn from(document: Document) -> Self {
        Update::Native(document)
    }
}

impl From<UpdateDefinition> for Update {
    fn from(definition: UpdateDefinition) -> Self {
        definition.build()
    }
}

/// Builder for native update documents.
///
/// Operations on different fields accumulate under their operator:
///
/// ```ignore
/// let update = UpdateDefinition::new()
///     .set("Name", "renamed")
///     .inc("Counter", 1)
///     .add_to_set("Tags", "new");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDefinition {
    operations: Document,
}

impl UpdateDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, operator: &str, field: impl Into<String>, value: Bson) -> Self {
        match self.operations.get_mut(operator) {
            Some(Bson::Document(fields)) => {
                fields.insert(field.into(), value);
            }
            _ => {
                let mut fields = Document::new();
                fields.insert(field.into(), value);
                self.operations.insert(operator, fields);
            }
        }
        self
    }

    /// Sets a field to a value.
    pub fn set(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with("$set", field, value.into())
    }

    /// Removes a field.
    pub fn unset(self, field: impl Into<String>) -> Self {
        self.with("$unset", field, Bson::String(String::new()))
    }

    /// Increments a numeric field.
    pub fn inc(self, field: impl Into<String>, amount: impl Into<Bson>) -> Self {
        self.with("$inc", field, amount.into())
    }

    /// Multiplies a numeric field.
    pub fn mul(self, field: impl Into<String>, factor: impl Into<Bson>) -> Self {
        self.with("$mul", field, factor.into())
    }

    /// Sets a field to the value if the value is lower than the current one.
    pub fn min(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with("$min", field, value.into())
    }

    /// Sets a field to the value if the value is greater than the current one.
    pub fn max(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with("$max", field, value.into())
    }

    /// Appends a value to an array field.
    pub fn push(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with("$push", field, value.into())
    }

    /// Appends several values to an array field.
    pub fn push_each(self, field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Self {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.with("$push", field, Bson::Document(doc! { "$each": values }))
    }

    /// Adds a value to an array field unless already present.
    pub fn add_to_set(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with("$addToSet", field, value.into())
    }

    /// Adds each value to an array field unless already present.
    pub fn add_to_set_each(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Bson>>,
    ) -> Self {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.with("$addToSet", field, Bson::Document(doc! { "$each": values }))
    }

    /// Removes every array element equal to the value.
    pub fn pull(self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with("$pull", field, value.into())
    }

    /// Renames a field.
    pub fn rename(self, field: impl Into<String>, new_name: impl Into<String>) -> Self {
        self.with("$rename", field, Bson::String(new_name.into()))
    }

    /// Returns `true` if no operation was added.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the native update document.
    pub fn to_native(&self) -> Document {
        self.operations.clone()
    }

    /// Finishes the definition.
    pub fn build(self) -> Update {
        Update::Native(self.operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_on_same_operator_accumulate() {
        let update = UpdateDefinition::new()
            .set("a", 1)
            .set("b.c", "x")
            .inc("n", 2);

        assert_eq!(
            update.to_native(),
            doc! { "$set": { "a": 1, "b.c": "x" }, "$inc": { "n": 2 } }
        );
    }

    #[test]
    fn each_variants_wrap_values() {
        let update = UpdateDefinition::new()
            .add_to_set_each("tags", ["a", "b"])
            .push_each("log", [1, 2]);

        assert_eq!(
            update.to_native(),
            doc! {
                "$addToSet": { "tags": { "$each": ["a", "b"] } },
                "$push": { "log": { "$each": [1, 2] } },
            }
        );
    }
}
