//! Value helpers shared by the evaluator, update and aggregation engines.
//!
//! Ordering follows the native cross-type comparison order, so sorts and range queries over
//! mixed types behave like the server's.

use bson::{Bson, Document};
use std::cmp::Ordering;

use docrepo_core::error::{DocumentStoreError, DocumentStoreResult};

/// A BSON value wrapped with the native total order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Comparable<'a>(pub &'a Bson);

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        Comparable(bson)
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Comparable<'_> {}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Comparable<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self.0, other.0)
    }
}

/// Rank of a value's type in the cross-type order.
pub(crate) fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Numeric value of an integer or double.
pub(crate) fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn compare_numbers(left: &Bson, right: &Bson) -> Ordering {
    match (left, right) {
        (Bson::Int32(a), Bson::Int32(b)) => a.cmp(b),
        (Bson::Int64(a), Bson::Int64(b)) => a.cmp(b),
        (Bson::Int32(a), Bson::Int64(b)) => i64::from(*a).cmp(b),
        (Bson::Int64(a), Bson::Int32(b)) => a.cmp(&i64::from(*b)),
        (Bson::Decimal128(a), Bson::Decimal128(b)) => a.bytes().cmp(&b.bytes()),
        _ => match (as_f64(left), as_f64(right)) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}

fn compare_documents(left: &Document, right: &Document) -> Ordering {
    for ((left_key, left_value), (right_key, right_value)) in left.iter().zip(right.iter()) {
        let ordering = left_key
            .cmp(right_key)
            .then_with(|| compare(left_value, right_value));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left.len().cmp(&right.len())
}

fn compare_arrays(left: &[Bson], right: &[Bson]) -> Ordering {
    for (a, b) in left.iter().zip(right.iter()) {
        let ordering = compare(a, b);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left.len().cmp(&right.len())
}

/// Compares two values in the native cross-type order.
pub(crate) fn compare(left: &Bson, right: &Bson) -> Ordering {
    let rank = type_rank(left).cmp(&type_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }

    match (left, right) {
        (Bson::String(a), Bson::String(b)) => a.cmp(b),
        (Bson::Symbol(a), Bson::Symbol(b)) => a.cmp(b),
        (Bson::String(a), Bson::Symbol(b)) | (Bson::Symbol(a), Bson::String(b)) => a.cmp(b),
        (Bson::Document(a), Bson::Document(b)) => compare_documents(a, b),
        (Bson::Array(a), Bson::Array(b)) => compare_arrays(a, b),
        (Bson::Binary(a), Bson::Binary(b)) => a
            .bytes
            .len()
            .cmp(&b.bytes.len())
            .then_with(|| u8::from(a.subtype).cmp(&u8::from(b.subtype)))
            .then_with(|| a.bytes.cmp(&b.bytes)),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
        (Bson::Boolean(a), Bson::Boolean(b)) => a.cmp(b),
        (Bson::DateTime(a), Bson::DateTime(b)) => a.cmp(b),
        (Bson::Timestamp(a), Bson::Timestamp(b)) => (a.time, a.increment).cmp(&(b.time, b.increment)),
        _ if type_rank(left) == 2 => compare_numbers(left, right),
        _ => Ordering::Equal,
    }
}

/// Native equality: numbers compare by value across integer and double types.
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    compare(left, right) == Ordering::Equal
}

/// Every value reachable at a dotted path, descending into arrays of documents.
pub(crate) fn lookup<'a>(value: &'a Bson, path: &[&str]) -> Vec<&'a Bson> {
    let Some((head, rest)) = path.split_first() else {
        return vec![value];
    };

    match value {
        Bson::Document(document) => document
            .get(*head)
            .map(|inner| lookup(inner, rest))
            .unwrap_or_default(),
        Bson::Array(items) => match head.parse::<usize>() {
            Ok(index) => items
                .get(index)
                .map(|inner| lookup(inner, rest))
                .unwrap_or_default(),
            Err(_) => items
                .iter()
                .filter(|item| matches!(item, Bson::Document(_)))
                .flat_map(|item| lookup(item, path))
                .collect(),
        },
        _ => Vec::new(),
    }
}

/// Every value at a dotted path of a document.
pub(crate) fn lookup_path<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((head, rest)) = segments.split_first() else {
        return Vec::new();
    };

    document
        .get(*head)
        .map(|value| lookup(value, rest))
        .unwrap_or_default()
}

/// The single value at a dotted path, without fanning out over arrays.
pub(crate) fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Mutable access to the value at a dotted path.
pub(crate) fn get_path_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Bson> {
    let mut segments = path.split('.');
    let mut current = document.get_mut(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get_mut(segment)?,
            Bson::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Sets the value at a dotted path, creating intermediate documents.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) -> DocumentStoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                Some(Bson::Array(items)) => set_in_array(items, path, rest, value),
                _ => Err(cannot_traverse(path, head)),
            }
        }
    }
}

fn set_in_array(items: &mut Vec<Bson>, path: &str, rest: &str, value: Bson) -> DocumentStoreResult<()> {
    let (head, tail) = match rest.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (rest, None),
    };
    let index = head
        .parse::<usize>()
        .map_err(|_| cannot_traverse(path, head))?;

    while items.len() <= index {
        items.push(Bson::Null);
    }

    match tail {
        None => {
            items[index] = value;
            Ok(())
        }
        Some(tail) => {
            if matches!(items[index], Bson::Null) {
                items[index] = Bson::Document(Document::new());
            }
            match &mut items[index] {
                Bson::Document(inner) => set_path(inner, tail, value),
                Bson::Array(nested) => set_in_array(nested, path, tail, value),
                _ => Err(cannot_traverse(path, head)),
            }
        }
    }
}

fn cannot_traverse(path: &str, segment: &str) -> DocumentStoreError {
    DocumentStoreError::InvalidQuery(format!(
        "cannot create field '{segment}' while updating path '{path}'"
    ))
}

/// Removes the value at a dotted path, returning it.
pub(crate) fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.rsplit_once('.') {
        None => document.remove(path),
        Some((parent, leaf)) => match get_path_mut(document, parent)? {
            Bson::Document(inner) => inner.remove(leaf),
            Bson::Array(items) => {
                let index = leaf.parse::<usize>().ok()?;
                items
                    .get_mut(index)
                    .map(|slot| std::mem::replace(slot, Bson::Null))
            }
            _ => None,
        },
    }
}

/// Native truthiness for projection and flag values.
pub(crate) fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Null | Bson::Undefined => false,
        other => as_f64(other).is_none_or(|n| n != 0.0),
    }
}

/// Reads an integral argument such as `$skip` or `$size`.
pub(crate) fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) if n.fract() == 0.0 => Some(*n as i64),
        _ => None,
    }
}

/// Adds two numbers with native type promotion.
pub(crate) fn add_numbers(left: &Bson, right: &Bson) -> Option<Bson> {
    match (left, right) {
        (Bson::Int32(a), Bson::Int32(b)) => Some(
            a.checked_add(*b)
                .map(Bson::Int32)
                .unwrap_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b))),
        ),
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            let a = as_i64(left)?;
            let b = as_i64(right)?;
            a.checked_add(b)
                .map(Bson::Int64)
                .or(Some(Bson::Double(a as f64 + b as f64)))
        }
        _ => Some(Bson::Double(as_f64(left)? + as_f64(right)?)),
    }
}

/// Multiplies two numbers with native type promotion.
pub(crate) fn multiply_numbers(left: &Bson, right: &Bson) -> Option<Bson> {
    match (left, right) {
        (Bson::Int32(a), Bson::Int32(b)) => Some(
            a.checked_mul(*b)
                .map(Bson::Int32)
                .unwrap_or_else(|| Bson::Int64(i64::from(*a) * i64::from(*b))),
        ),
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            let a = as_i64(left)?;
            let b = as_i64(right)?;
            a.checked_mul(b)
                .map(Bson::Int64)
                .or(Some(Bson::Double(a as f64 * b as f64)))
        }
        _ => Some(Bson::Double(as_f64(left)? * as_f64(right)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn numbers_compare_across_types() {
        assert!(values_equal(&Bson::Int32(1), &Bson::Double(1.0)));
        assert_eq!(compare(&Bson::Int64(2), &Bson::Double(1.5)), Ordering::Greater);
    }

    #[test]
    fn cross_type_order_puts_null_before_numbers_before_strings() {
        let mut values = vec![Bson::String("a".into()), Bson::Int32(3), Bson::Null];
        values.sort_by(compare);

        assert_eq!(values, vec![Bson::Null, Bson::Int32(3), Bson::String("a".into())]);
    }

    #[test]
    fn lookup_fans_out_over_arrays_of_documents() {
        let document = doc! { "items": [ { "n": 1 }, { "n": 2 } ] };

        assert_eq!(lookup_path(&document, "items.n"), vec![&Bson::Int32(1), &Bson::Int32(2)]);
        assert_eq!(lookup_path(&document, "items.1.n"), vec![&Bson::Int32(2)]);
    }

    #[test]
    fn set_path_creates_intermediate_documents() {
        let mut document = doc! { "a": 1 };
        set_path(&mut document, "b.c", Bson::Int32(2)).unwrap();

        assert_eq!(document, doc! { "a": 1, "b": { "c": 2 } });
    }

    #[test]
    fn set_path_rejects_scalar_parent() {
        let mut document = doc! { "a": 1 };

        assert!(set_path(&mut document, "a.b", Bson::Int32(2)).is_err());
    }

    #[test]
    fn remove_nested_path() {
        let mut document = doc! { "a": { "b": 1, "c": 2 } };

        assert_eq!(remove_path(&mut document, "a.b"), Some(Bson::Int32(1)));
        assert_eq!(document, doc! { "a": { "c": 2 } });
    }

    #[test]
    fn integer_addition_promotes_on_overflow() {
        assert_eq!(add_numbers(&Bson::Int32(i32::MAX), &Bson::Int32(1)), Some(Bson::Int64(i64::from(i32::MAX) + 1)));
        assert_eq!(add_numbers(&Bson::Int32(1), &Bson::Double(0.5)), Some(Bson::Double(1.5)));
        assert_eq!(add_numbers(&Bson::String("x".into()), &Bson::Int32(1)), None);
    }
}
