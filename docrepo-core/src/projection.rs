//! Shape-changing reads: projections and groupings.

use bson::{Bson, Document, doc};

use crate::document::ID_FIELD;

/// A native projection document built field by field.
///
/// Inclusion and exclusion cannot be mixed, except for suppressing `_id`:
///
/// ```ignore
/// let projection = Projection::new()
///     .include("SomeContent")
///     .alias("When", "Nested.SomeDate")
///     .without_id();
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    fields: Document,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the field at this path.
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.fields.insert(path.into(), 1);
        self
    }

    /// Keeps every field at these paths.
    pub fn include_all<S: Into<String>>(self, paths: impl IntoIterator<Item = S>) -> Self {
        paths
            .into_iter()
            .fold(self, |projection, path| projection.include(path))
    }

    /// Drops the field at this path.
    pub fn exclude(mut self, path: impl Into<String>) -> Self {
        self.fields.insert(path.into(), 0);
        self
    }

    /// Outputs the value found at `source` under the name `alias`.
    pub fn alias(mut self, alias: impl Into<String>, source: &str) -> Self {
        self.fields.insert(alias.into(), format!("${source}"));
        self
    }

    /// Suppresses the `_id` field in the output.
    pub fn without_id(mut self) -> Self {
        self.fields.insert(ID_FIELD, 0);
        self
    }

    /// Returns the native projection document.
    pub fn to_native(&self) -> Document {
        self.fields.clone()
    }
}

impl From<Document> for Projection {
    fn from(fields: Document) -> Self {
        Self { fields }
    }
}

/// A grouping: a key path plus named accumulators, run as a native `$group` stage.
///
/// Each output document carries the group key under `_id` and one field per accumulator.
///
/// ```ignore
/// let grouping = Grouping::by("SomeContent")
///     .count("Count")
///     .sum("Total", "SomeValue")
///     .push("Ids", "_id");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    key: Bson,
    accumulators: Document,
}

impl Grouping {
    /// Groups by the value at a field path.
    pub fn by(path: &str) -> Self {
        Self {
            key: Bson::String(format!("${path}")),
            accumulators: Document::new(),
        }
    }

    /// Groups by a native key expression (for compound keys).
    pub fn by_expression(key: impl Into<Bson>) -> Self {
        Self { key: key.into(), accumulators: Document::new() }
    }

    fn accumulate(mut self, output: impl Into<String>, operator: &str, argument: Bson) -> Self {
        let mut accumulator = Document::new();
        accumulator.insert(operator, argument);
        self.accumulators.insert(output.into(), accumulator);
        self
    }

    /// Number of documents in the group.
    pub fn count(self, output: impl Into<String>) -> Self {
        self.accumulate(output, "$sum", Bson::Int32(1))
    }

    /// Sum of the values at `path`.
    pub fn sum(self, output: impl Into<String>, path: &str) -> Self {
        self.accumulate(output, "$sum", Bson::String(format!("${path}")))
    }

    /// Average of the values at `path`.
    pub fn avg(self, output: impl Into<String>, path: &str) -> Self {
        self.accumulate(output, "$avg", Bson::String(format!("${path}")))
    }

    /// Smallest value at `path`.
    pub fn min(self, output: impl Into<String>, path: &str) -> Self {
        self.accumulate(output, "$min", Bson::String(format!("${path}")))
    }

    /// Largest value at `path`.
    pub fn max(self, output: impl Into<String>, path: &str) -> Self {
        self.accumulate(output, "$max", Bson::String(format!("${path}")))
    }

    /// Value at `path` of the first document of the group.
    pub fn first(self, output: impl Into<String>, path: &str) -> Self {
        self.accumulate(output, "$first", Bson::String(format!("${path}")))
    }

    /// Value at `path` of the last document of the group.
    pub fn last(self, output: impl Into<String>, path: &str) -> Self {
        self.accumulate(output, "$last", Bson::String(format!("${path}")))
    }

    /// Every value at `path`, in group order.
    pub fn push(self, output: impl Into<String>, path: &str) -> Self {
        self.accumulate(output, "$push", Bson::String(format!("${path}")))
    }

    /// Every whole document of the group.
    pub fn push_documents(self, output: impl Into<String>) -> Self {
        self.accumulate(output, "$push", Bson::String("$$ROOT".to_string()))
    }

    /// Distinct values at `path`.
    pub fn add_to_set(self, output: impl Into<String>, path: &str) -> Self {
        self.accumulate(output, "$addToSet", Bson::String(format!("${path}")))
    }

    /// Returns the native `$group` stage.
    pub fn to_stage(&self) -> Document {
        let mut group = doc! { ID_FIELD: self.key.clone() };
        for (output, accumulator) in &self.accumulators {
            group.insert(output.clone(), accumulator.clone());
        }

        doc! { "$group": group }
    }
}
