//! A small aggregation pipeline engine.
//!
//! Supported stages are `$match`, `$group`, `$sort`, `$skip`, `$limit`, `$project` and
//! `$count`. Group accumulators are `$sum`, `$avg`, `$min`, `$max`, `$first`, `$last`,
//! `$push` and `$addToSet`. Expressions are field paths (`"$a.b"`), `"$$ROOT"`, `$literal`,
//! compound documents and arrays of expressions; anything else is a literal.

use bson::{Bson, Document};

use docrepo_core::error::{DocumentStoreError, DocumentStoreResult};

use crate::{
    evaluator::{DocumentEvaluator, sort_documents},
    projection::project,
    value::{Comparable, add_numbers, as_f64, as_i64, lookup_path, values_equal},
};

fn invalid(message: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::InvalidQuery(message.into())
}

/// Evaluates an aggregation expression against a document. `None` means the expression
/// refers to a missing field.
pub(crate) fn evaluate_expression(document: &Document, expression: &Bson) -> DocumentStoreResult<Option<Bson>> {
    match expression {
        Bson::String(reference) if reference == "$$ROOT" => Ok(Some(Bson::Document(document.clone()))),
        Bson::String(reference) if reference.starts_with("$$") => {
            Err(invalid(format!("unsupported variable {reference}")))
        }
        Bson::String(reference) if reference.starts_with('$') => {
            let mut found = lookup_path(document, &reference[1..]);
            Ok(match found.len() {
                0 => None,
                1 => found.pop().cloned(),
                _ => Some(Bson::Array(found.into_iter().cloned().collect())),
            })
        }
        Bson::Document(operator) if operator.len() == 1 && operator.keys().all(|k| k.starts_with('$')) => {
            match operator.iter().next() {
                Some((name, value)) if name == "$literal" => Ok(Some(value.clone())),
                Some((name, _)) => Err(invalid(format!("unsupported expression operator {name}"))),
                None => Ok(Some(Bson::Document(Document::new()))),
            }
        }
        Bson::Document(fields) => {
            let mut computed = Document::new();
            for (field, inner) in fields {
                if let Some(value) = evaluate_expression(document, inner)? {
                    computed.insert(field.clone(), value);
                }
            }
            Ok(Some(Bson::Document(computed)))
        }
        Bson::Array(items) => {
            let mut computed = Vec::with_capacity(items.len());
            for item in items {
                computed.push(evaluate_expression(document, item)?.unwrap_or(Bson::Null));
            }
            Ok(Some(Bson::Array(computed)))
        }
        literal => Ok(Some(literal.clone())),
    }
}

/// Runs `pipeline` over `documents`.
pub(crate) fn run_pipeline(documents: Vec<Document>, pipeline: &[Document]) -> DocumentStoreResult<Vec<Document>> {
    let mut current = documents;

    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, argument)), None) = (entries.next(), entries.next()) else {
            return Err(invalid("each pipeline stage must have exactly one operator"));
        };

        current = match name.as_str() {
            "$match" => {
                let filter = stage_document(name, argument)?;
                let evaluator = DocumentEvaluator::new(filter);
                let mut matched = Vec::with_capacity(current.len());
                for document in current {
                    if evaluator.matches(&document)? {
                        matched.push(document);
                    }
                }
                matched
            }
            "$group" => group(current, stage_document(name, argument)?)?,
            "$sort" => {
                sort_documents(&mut current, stage_document(name, argument)?)?;
                current
            }
            "$skip" => {
                let skip = stage_count(name, argument)?;
                current.into_iter().skip(skip).collect()
            }
            "$limit" => {
                let limit = stage_count(name, argument)?;
                current.truncate(limit);
                current
            }
            "$project" => {
                let projection = stage_document(name, argument)?;
                current
                    .iter()
                    .map(|document| project(document, projection))
                    .collect::<DocumentStoreResult<Vec<_>>>()?
            }
            "$count" => {
                let Bson::String(field) = argument else {
                    return Err(invalid("$count needs a field name"));
                };
                if current.is_empty() {
                    Vec::new()
                } else {
                    let mut counted = Document::new();
                    counted.insert(field.clone(), count_value(current.len()));
                    vec![counted]
                }
            }
            other => return Err(invalid(format!("unsupported pipeline stage {other}"))),
        };
    }

    Ok(current)
}

fn stage_document<'a>(name: &str, argument: &'a Bson) -> DocumentStoreResult<&'a Document> {
    match argument {
        Bson::Document(document) => Ok(document),
        _ => Err(invalid(format!("{name} needs a document"))),
    }
}

fn stage_count(name: &str, argument: &Bson) -> DocumentStoreResult<usize> {
    as_i64(argument)
        .filter(|n| *n >= 0)
        .map(|n| n as usize)
        .ok_or_else(|| invalid(format!("{name} needs a non-negative integer")))
}

fn count_value(count: usize) -> Bson {
    i32::try_from(count)
        .map(Bson::Int32)
        .unwrap_or(Bson::Int64(count as i64))
}

#[derive(Debug, Clone)]
enum Accumulator {
    Sum(Bson),
    Avg { total: f64, count: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
    Last(Bson),
    Push(Vec<Bson>),
    AddToSet(Vec<Bson>),
}

impl Accumulator {
    fn new(operator: &str) -> DocumentStoreResult<Self> {
        Ok(match operator {
            "$sum" => Accumulator::Sum(Bson::Int32(0)),
            "$avg" => Accumulator::Avg { total: 0.0, count: 0 },
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            "$first" => Accumulator::First(None),
            "$last" => Accumulator::Last(Bson::Null),
            "$push" => Accumulator::Push(Vec::new()),
            "$addToSet" => Accumulator::AddToSet(Vec::new()),
            other => return Err(invalid(format!("unsupported accumulator {other}"))),
        })
    }

    fn accumulate(&mut self, value: Option<Bson>) -> DocumentStoreResult<()> {
        match self {
            Accumulator::Sum(total) => match value {
                Some(Bson::Decimal128(_)) => {
                    return Err(invalid("$sum over decimal values is not supported in memory"));
                }
                Some(number) if as_f64(&number).is_some() => {
                    if let Some(sum) = add_numbers(total, &number) {
                        *total = sum;
                    }
                }
                _ => {}
            },
            Accumulator::Avg { total, count } => {
                if let Some(number) = value.as_ref().and_then(as_f64) {
                    *total += number;
                    *count += 1;
                }
            }
            Accumulator::Min(current) => keep_extreme(current, value, std::cmp::Ordering::Less),
            Accumulator::Max(current) => keep_extreme(current, value, std::cmp::Ordering::Greater),
            Accumulator::First(current) => {
                if current.is_none() {
                    *current = Some(value.unwrap_or(Bson::Null));
                }
            }
            Accumulator::Last(current) => *current = value.unwrap_or(Bson::Null),
            Accumulator::Push(items) => {
                if let Some(value) = value {
                    items.push(value);
                }
            }
            Accumulator::AddToSet(items) => {
                if let Some(value) = value {
                    if !items.iter().any(|existing| values_equal(existing, &value)) {
                        items.push(value);
                    }
                }
            }
        }

        Ok(())
    }

    fn finish(self) -> Bson {
        match self {
            Accumulator::Sum(total) => total,
            Accumulator::Avg { count: 0, .. } => Bson::Null,
            Accumulator::Avg { total, count } => Bson::Double(total / count as f64),
            Accumulator::Min(value) | Accumulator::Max(value) | Accumulator::First(value) => {
                value.unwrap_or(Bson::Null)
            }
            Accumulator::Last(value) => value,
            Accumulator::Push(items) | Accumulator::AddToSet(items) => Bson::Array(items),
        }
    }
}

fn keep_extreme(current: &mut Option<Bson>, candidate: Option<Bson>, wanted: std::cmp::Ordering) {
    let Some(candidate) = candidate.filter(|value| !matches!(value, Bson::Null | Bson::Undefined)) else {
        return;
    };

    let replace = match current {
        Some(existing) => Comparable(&candidate).cmp(&Comparable(existing)) == wanted,
        None => true,
    };

    if replace {
        *current = Some(candidate);
    }
}

struct GroupSpec<'a> {
    key: &'a Bson,
    accumulators: Vec<(&'a str, &'a str, &'a Bson)>,
}

impl<'a> GroupSpec<'a> {
    fn parse(stage: &'a Document) -> DocumentStoreResult<Self> {
        let key = stage
            .get("_id")
            .ok_or_else(|| invalid("$group needs an _id expression"))?;
        let mut accumulators = Vec::new();

        for (field, definition) in stage {
            if field == "_id" {
                continue;
            }

            let Bson::Document(definition) = definition else {
                return Err(invalid(format!("accumulator for {field} must be a document")));
            };
            let mut entries = definition.iter();
            let (Some((operator, expression)), None) = (entries.next(), entries.next()) else {
                return Err(invalid(format!("accumulator for {field} must have exactly one operator")));
            };
            Accumulator::new(operator)?;
            accumulators.push((field.as_str(), operator.as_str(), expression));
        }

        Ok(Self { key, accumulators })
    }
}

fn group(documents: Vec<Document>, stage: &Document) -> DocumentStoreResult<Vec<Document>> {
    let spec = GroupSpec::parse(stage)?;
    let mut groups: Vec<(Bson, Vec<Accumulator>)> = Vec::new();

    for document in &documents {
        let key = evaluate_expression(document, spec.key)?.unwrap_or(Bson::Null);

        let position = match groups.iter().position(|(existing, _)| values_equal(existing, &key)) {
            Some(position) => position,
            None => {
                let accumulators = spec
                    .accumulators
                    .iter()
                    .map(|(_, operator, _)| Accumulator::new(operator))
                    .collect::<DocumentStoreResult<Vec<_>>>()?;
                groups.push((key, accumulators));
                groups.len() - 1
            }
        };

        let (_, accumulators) = &mut groups[position];
        for ((_, _, expression), accumulator) in spec.accumulators.iter().zip(accumulators.iter_mut()) {
            accumulator.accumulate(evaluate_expression(document, expression)?)?;
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accumulators)| {
            let mut output = Document::new();
            output.insert("_id", key);
            for ((field, _, _), accumulator) in spec.accumulators.iter().zip(accumulators) {
                output.insert(*field, accumulator.finish());
            }
            output
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn orders() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "Status": "open", "Amount": 10, "Tag": "a" },
            doc! { "_id": 2, "Status": "closed", "Amount": 5, "Tag": "b" },
            doc! { "_id": 3, "Status": "open", "Amount": 7, "Tag": "a" },
        ]
    }

    #[test]
    fn group_with_accumulators_in_first_seen_order() {
        let pipeline = vec![doc! {
            "$group": {
                "_id": "$Status",
                "Total": { "$sum": "$Amount" },
                "Count": { "$sum": 1 },
                "Average": { "$avg": "$Amount" },
                "Smallest": { "$min": "$Amount" },
                "Tags": { "$addToSet": "$Tag" },
            }
        }];

        let grouped = run_pipeline(orders(), &pipeline).unwrap();

        assert_eq!(
            grouped,
            vec![
                doc! { "_id": "open", "Total": 17, "Count": 2, "Average": 8.5, "Smallest": 7, "Tags": ["a"] },
                doc! { "_id": "closed", "Total": 5, "Count": 1, "Average": 5.0, "Smallest": 5, "Tags": ["b"] },
            ]
        );
    }

    #[test]
    fn decimal_sums_are_rejected() {
        let amount = bson::Decimal128::from_bytes([0; 16]);
        let documents = vec![doc! { "_id": 1, "Amount": amount }];
        let pipeline = vec![doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$Amount" } } }];

        assert!(matches!(
            run_pipeline(documents, &pipeline),
            Err(DocumentStoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn sum_over_empty_input_yields_no_group() {
        let pipeline = vec![
            doc! { "$match": { "Status": "missing" } },
            doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$Amount" } } },
        ];

        assert!(run_pipeline(orders(), &pipeline).unwrap().is_empty());
    }

    #[test]
    fn sort_skip_limit_and_project() {
        let pipeline = vec![
            doc! { "$sort": { "Amount": -1 } },
            doc! { "$skip": 1 },
            doc! { "$limit": 1 },
            doc! { "$project": { "_id": 0, "Value": "$Amount" } },
        ];

        assert_eq!(run_pipeline(orders(), &pipeline).unwrap(), vec![doc! { "Value": 7 }]);
    }

    #[test]
    fn count_stage() {
        let pipeline = vec![doc! { "$match": { "Tag": "a" } }, doc! { "$count": "n" }];

        assert_eq!(run_pipeline(orders(), &pipeline).unwrap(), vec![doc! { "n": 2 }]);
    }

    #[test]
    fn compound_group_keys() {
        let pipeline = vec![doc! { "$group": { "_id": { "s": "$Status", "t": "$Tag" }, "n": { "$sum": 1 } } }];

        assert_eq!(run_pipeline(orders(), &pipeline).unwrap().len(), 2);
    }

    #[test]
    fn unknown_stage_is_rejected() {
        assert!(run_pipeline(orders(), &[doc! { "$lookup": {} }]).is_err());
    }
}
