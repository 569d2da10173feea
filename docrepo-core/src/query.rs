//! Filter construction for repository reads, updates and deletes.
//!
//! A filter is either a typed predicate ([`Expr`]) describing field comparisons, or a native
//! filter document already written in the driver's query dialect. Both are wrapped in
//! [`Criteria`] and translated to a single native form before execution, so equivalent
//! conditions select the same documents regardless of how they were written.
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides static constructors and [`Field`] a fluent equivalent:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`, `not_contains`
//! - Existence: `exists`, `not_exists`
//! - Array: `any_of`, `none_of`
//! - Logical: `and`, `or`, `not`
//!
//! Field names are document paths; nested fields use dots (`"Nested.SomeDate"`).
//!
//! ```ignore
//! use docrepo::query::{Field, Filter};
//!
//! let adults = Filter::gte("age", 18).and(Field::new("status").eq("active"));
//! ```

use bson::{Bson, Document};
use std::time::Duration;

use crate::error::DocumentStoreError;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    #[default]
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The native sort value for this direction.
    pub fn native(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub enum Sort {
    /// Sort by a single field path.
    Field {
        /// The field path to sort by.
        field: String,
        /// The sort direction.
        direction: SortDirection,
    },
    /// A native sort document, passed through unchanged.
    Native(Document),
}

impl Sort {
    /// Ascending sort on a field.
    pub fn asc(field: impl Into<String>) -> Self {
        Sort::Field { field: field.into(), direction: SortDirection::Asc }
    }

    /// Descending sort on a field.
    pub fn desc(field: impl Into<String>) -> Self {
        Sort::Field { field: field.into(), direction: SortDirection::Desc }
    }

    /// Sort on a field in the given direction.
    pub fn by(field: impl Into<String>, direction: SortDirection) -> Self {
        Sort::Field { field: field.into(), direction }
    }

    /// Converts this specification into a native sort document.
    pub fn to_native(&self) -> Document {
        match self {
            Sort::Field { field, direction } => {
                let mut document = Document::new();
                document.insert(field.clone(), direction.native());
                document
            }
            Sort::Native(document) => document.clone(),
        }
    }
}

impl From<Document> for Sort {
    fn from(document: Document) -> Self {
        Sort::Native(document)
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String contains substring, or array contains all given values.
    Contains,
    /// String does not contain substring, or array contains none of the given values.
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Field equals (or array field contains) any of the values.
    AnyOf,
    /// Field equals (or array field contains) none of the values.
    NoneOf,
}

/// A typed predicate over document fields.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field path to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// The selection part of an operation: everything, a typed predicate, or a native filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Criteria {
    /// Matches every document.
    #[default]
    All,
    /// A typed predicate, translated before execution.
    Expr(Expr),
    /// A native filter document, passed through unchanged.
    Native(Document),
}

impl Criteria {
    /// Matches every document.
    pub fn all() -> Self {
        Criteria::All
    }
}

impl From<Expr> for Criteria {
    fn from(expr: Expr) -> Self {
        Criteria::Expr(expr)
    }
}

impl From<Document> for Criteria {
    fn from(document: Document) -> Self {
        Criteria::Native(document)
    }
}

impl From<Option<Expr>> for Criteria {
    fn from(expr: Option<Expr>) -> Self {
        expr.map(Criteria::Expr).unwrap_or_default()
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>` for ergonomics.
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the specified value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the specified value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the specified value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the specified value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the string field starts with the specified value.
    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    /// Matches documents where the string field ends with the specified value.
    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// Matches documents where the field (string or array) contains the specified value.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// Matches documents where the field (string or array) does not contain the specified value.
    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    /// Matches documents where the field exists.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field does not exist.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Combines multiple expressions such that all must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Combines multiple expressions such that any can match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Inverts an expression.
    pub fn not(expr: Expr) -> Expr {
        expr.not()
    }

    /// Matches documents where the field equals any of the specified values.
    pub fn any_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::AnyOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field equals none of the specified values.
    pub fn none_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::NoneOf,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }
}

/// Fluent constructor for expressions on a single field path.
///
/// ```ignore
/// let expr = Field::new("Nested.SomeValue").gt(10);
/// ```
#[derive(Debug, Clone)]
pub struct Field {
    path: String,
}

impl Field {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn eq(self, value: impl Into<Bson>) -> Expr {
        Filter::eq(self.path, value)
    }

    pub fn ne(self, value: impl Into<Bson>) -> Expr {
        Filter::ne(self.path, value)
    }

    pub fn gt(self, value: impl Into<Bson>) -> Expr {
        Filter::gt(self.path, value)
    }

    pub fn gte(self, value: impl Into<Bson>) -> Expr {
        Filter::gte(self.path, value)
    }

    pub fn lt(self, value: impl Into<Bson>) -> Expr {
        Filter::lt(self.path, value)
    }

    pub fn lte(self, value: impl Into<Bson>) -> Expr {
        Filter::lte(self.path, value)
    }

    pub fn contains(self, value: impl Into<Bson>) -> Expr {
        Filter::contains(self.path, value)
    }

    pub fn starts_with(self, value: impl Into<Bson>) -> Expr {
        Filter::starts_with(self.path, value)
    }

    pub fn ends_with(self, value: impl Into<Bson>) -> Expr {
        Filter::ends_with(self.path, value)
    }

    pub fn exists(self) -> Expr {
        Filter::exists(self.path)
    }

    pub fn any_of(self, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Filter::any_of(self.path, values)
    }

    pub fn none_of(self, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Filter::none_of(self.path, values)
    }
}

/// An index hint, by name or by key pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    Name(String),
    Keys(Document),
}

/// Native query options forwarded to the backend unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Index the query planner should use.
    pub hint: Option<Hint>,
    /// Comment attached to the operation in server logs and profiler output.
    pub comment: Option<String>,
    /// Server-side time limit for the operation.
    pub max_time: Option<Duration>,
}

/// Visitor over [`Expr`] trees, implemented by filter translators.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
