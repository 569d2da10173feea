//! Native filter evaluation for in-memory document filtering.
//!
//! This module interprets MongoDB query documents against stored documents: logical
//! operators at the top level, field conditions on dotted paths, and the comparison,
//! membership, existence and pattern operators. A condition on an array field matches when
//! the array itself or any of its elements satisfies it.

use bson::{Bson, Document};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

use docrepo_core::error::{DocumentStoreError, DocumentStoreResult};

use crate::value::{as_i64, compare, lookup_path, type_rank, values_equal};

/// Evaluates one native filter against documents.
pub(crate) struct DocumentEvaluator<'f> {
    filter: &'f Document,
}

impl<'f> DocumentEvaluator<'f> {
    pub fn new(filter: &'f Document) -> Self {
        Self { filter }
    }

    /// Returns `true` when `document` satisfies the filter.
    pub fn matches(&self, document: &Document) -> DocumentStoreResult<bool> {
        matches_filter(document, self.filter)
    }

    /// Returns the documents satisfying the filter, in their original order.
    pub fn filter_documents<'d>(
        &self,
        documents: impl IntoIterator<Item = &'d Document>,
    ) -> DocumentStoreResult<Vec<&'d Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if self.matches(document)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }
}

fn invalid(message: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::InvalidQuery(message.into())
}

fn sub_filters<'a>(operator: &str, value: &'a Bson) -> DocumentStoreResult<Vec<&'a Document>> {
    match value {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Bson::Document(filter) => Ok(filter),
                _ => Err(invalid(format!("{operator} entries must be documents"))),
            })
            .collect(),
        _ => Err(invalid(format!("{operator} needs a non-empty array"))),
    }
}

fn matches_filter(document: &Document, filter: &Document) -> DocumentStoreResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, condition)? {
                    if !matches_filter(document, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_filters(key, condition)? {
                    if matches_filter(document, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for sub in sub_filters(key, condition)? {
                    if matches_filter(document, sub)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            "$comment" => true,
            operator if operator.starts_with('$') => {
                return Err(invalid(format!("unsupported top-level operator {operator}")));
            }
            path => matches_field(document, path, condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(document) => document
            .keys()
            .next()
            .is_some_and(|key| key.starts_with('$')),
        _ => false,
    }
}

fn matches_field(document: &Document, path: &str, condition: &Bson) -> DocumentStoreResult<bool> {
    let values = lookup_path(document, path);

    match condition {
        Bson::Document(operators) if is_operator_document(condition) => {
            matches_operators(&values, operators)
        }
        _ => Ok(equals_any(&values, condition)),
    }
}

/// Values a condition is tested against: each value, plus the elements of array values.
fn candidates<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut expanded = Vec::with_capacity(values.len());

    for value in values {
        expanded.push(*value);
        if let Bson::Array(items) = value {
            expanded.extend(items.iter());
        }
    }

    expanded
}

fn equals_any(values: &[&Bson], expected: &Bson) -> bool {
    if matches!(expected, Bson::Null) && values.is_empty() {
        return true;
    }

    candidates(values)
        .into_iter()
        .any(|value| values_equal(value, expected))
}

fn compares_any(values: &[&Bson], expected: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    candidates(values)
        .into_iter()
        .filter(|value| type_rank(value) == type_rank(expected))
        .any(|value| accept(compare(value, expected)))
}

fn matches_operators(values: &[&Bson], operators: &Document) -> DocumentStoreResult<bool> {
    let options = operators.get_str("$options").unwrap_or_default();

    for (operator, argument) in operators {
        let matched = match operator.as_str() {
            "$eq" => equals_any(values, argument),
            "$ne" => !equals_any(values, argument),
            "$gt" => compares_any(values, argument, |o| o == Ordering::Greater),
            "$gte" => compares_any(values, argument, |o| o != Ordering::Less),
            "$lt" => compares_any(values, argument, |o| o == Ordering::Less),
            "$lte" => compares_any(values, argument, |o| o != Ordering::Greater),
            "$in" => in_list(values, operator, argument)?,
            "$nin" => !in_list(values, operator, argument)?,
            "$exists" => match argument {
                Bson::Boolean(should_exist) => values.is_empty() != *should_exist,
                other => values.is_empty() != crate::value::is_truthy(other),
            },
            "$regex" => {
                let pattern = match argument {
                    Bson::String(pattern) => pattern,
                    _ => return Err(invalid("$regex needs a string pattern")),
                };
                let regex = build_regex(pattern, options)?;
                candidates(values)
                    .into_iter()
                    .any(|value| matches!(value, Bson::String(s) if regex.is_match(s)))
            }
            "$options" => true,
            "$not" => match argument {
                Bson::Document(inner) => !matches_operators(values, inner)?,
                _ => return Err(invalid("$not needs an operator document")),
            },
            "$all" => match argument {
                Bson::Array(required) => {
                    !required.is_empty() && required.iter().all(|item| equals_any(values, item))
                }
                _ => return Err(invalid("$all needs an array")),
            },
            "$size" => {
                let size = as_i64(argument).ok_or_else(|| invalid("$size needs an integer"))?;
                values
                    .iter()
                    .any(|value| matches!(value, Bson::Array(items) if items.len() as i64 == size))
            }
            "$elemMatch" => match argument {
                Bson::Document(inner) => elem_match(values, inner)?,
                _ => return Err(invalid("$elemMatch needs a document")),
            },
            other => return Err(invalid(format!("unsupported operator {other}"))),
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn in_list(values: &[&Bson], operator: &str, argument: &Bson) -> DocumentStoreResult<bool> {
    match argument {
        Bson::Array(items) => Ok(items.iter().any(|item| equals_any(values, item))),
        _ => Err(invalid(format!("{operator} needs an array"))),
    }
}

fn elem_match(values: &[&Bson], condition: &Document) -> DocumentStoreResult<bool> {
    let scalar_condition = condition.keys().all(|key| key.starts_with('$'));

    for value in values {
        let Bson::Array(items) = value else {
            continue;
        };

        for item in items {
            let matched = match item {
                Bson::Document(element) if !scalar_condition => matches_filter(element, condition)?,
                element if scalar_condition => matches_operators(&[element], condition)?,
                _ => false,
            };
            if matched {
                return Ok(true);
            }
        }
    }

    Ok(false)
}

fn build_regex(pattern: &str, options: &str) -> DocumentStoreResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| invalid(format!("invalid $regex: {e}")))
}

/// Tests a single value against a `$pull`-style condition.
pub(crate) fn matches_condition(value: &Bson, condition: &Bson) -> DocumentStoreResult<bool> {
    match (value, condition) {
        (_, Bson::Document(operators)) if is_operator_document(condition) => {
            matches_operators(&[value], operators)
        }
        (Bson::Document(element), Bson::Document(filter)) => Ok(matches_filter(element, filter)?
            || values_equal(value, condition)),
        _ => Ok(values_equal(value, condition)),
    }
}

/// Sorts documents in place by a native sort document. The sort is stable; missing fields
/// order as null.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) -> DocumentStoreResult<()> {
    let mut keys = Vec::with_capacity(sort.len());

    for (field, direction) in sort {
        let descending = match as_i64(direction) {
            Some(1) => false,
            Some(-1) => true,
            _ => return Err(invalid(format!("invalid sort direction for {field}"))),
        };
        keys.push((field.as_str(), descending));
    }

    documents.sort_by(|left, right| {
        for (field, descending) in &keys {
            let left_value = lookup_path(left, field).first().copied().unwrap_or(&Bson::Null);
            let right_value = lookup_path(right, field).first().copied().unwrap_or(&Bson::Null);
            let ordering = compare(left_value, right_value);
            let ordering = if *descending { ordering.reverse() } else { ordering };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn sorting_is_stable_and_puts_missing_first() {
        let mut documents = vec![
            doc! { "_id": 1, "n": 2 },
            doc! { "_id": 2 },
            doc! { "_id": 3, "n": 1 },
            doc! { "_id": 4, "n": 2 },
        ];

        sort_documents(&mut documents, &doc! { "n": 1 }).unwrap();
        let ids: Vec<i32> = documents.iter().map(|d| d.get_i32("_id").unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 1, 4]);

        sort_documents(&mut documents, &doc! { "n": -1 }).unwrap();
        let ids: Vec<i32> = documents.iter().map(|d| d.get_i32("_id").unwrap()).collect();
        assert_eq!(ids, vec![1, 4, 3, 2]);
    }

    fn check(document: Document, filter: Document) -> bool {
        DocumentEvaluator::new(&filter).matches(&document).unwrap()
    }

    #[test]
    fn implicit_and_explicit_equality() {
        let document = doc! { "SomeContent": "X", "n": 3 };

        assert!(check(document.clone(), doc! { "SomeContent": "X" }));
        assert!(check(document.clone(), doc! { "n": { "$eq": 3.0 } }));
        assert!(!check(document, doc! { "SomeContent": "Y" }));
    }

    #[test]
    fn range_operators_respect_type_brackets() {
        let document = doc! { "n": 5 };

        assert!(check(document.clone(), doc! { "n": { "$gt": 4, "$lte": 5 } }));
        assert!(!check(document, doc! { "n": { "$gt": "a" } }));
    }

    #[test]
    fn arrays_match_on_elements() {
        let document = doc! { "tags": ["a", "b"] };

        assert!(check(document.clone(), doc! { "tags": "a" }));
        assert!(check(document.clone(), doc! { "tags": { "$in": ["z", "b"] } }));
        assert!(check(document.clone(), doc! { "tags": { "$all": ["a", "b"] } }));
        assert!(check(document, doc! { "tags": { "$size": 2 } }));
    }

    #[test]
    fn nested_paths_and_existence() {
        let document = doc! { "Nested": { "SomeValue": 7 } };

        assert!(check(document.clone(), doc! { "Nested.SomeValue": 7 }));
        assert!(check(document.clone(), doc! { "Nested.Missing": { "$exists": false } }));
        assert!(check(document, doc! { "Nested.Missing": Bson::Null }));
    }

    #[test]
    fn logical_operators() {
        let document = doc! { "a": 1, "b": 2 };

        assert!(check(document.clone(), doc! { "$or": [ { "a": 9 }, { "b": 2 } ] }));
        assert!(check(document.clone(), doc! { "$nor": [ { "a": 9 } ] }));
        assert!(!check(document.clone(), doc! { "$and": [ { "a": 1 }, { "b": 3 } ] }));
        assert!(check(document, doc! { "a": { "$not": { "$gt": 5 } } }));
    }

    #[test]
    fn regex_is_case_sensitive_unless_asked() {
        let document = doc! { "name": "Alpha" };

        assert!(check(document.clone(), doc! { "name": { "$regex": "^Al" } }));
        assert!(!check(document.clone(), doc! { "name": { "$regex": "^al" } }));
        assert!(check(document, doc! { "name": { "$regex": "^al", "$options": "i" } }));
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let filter = doc! { "a": { "$near": 1 } };

        assert!(DocumentEvaluator::new(&filter).matches(&doc! { "a": 1 }).is_err());
    }
}
