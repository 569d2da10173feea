//! Application of native update operator documents to stored documents.

use bson::{Bson, Document};
use std::cmp::Ordering;

use docrepo_core::{
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::{
    evaluator::matches_condition,
    value::{add_numbers, compare, get_path, get_path_mut, multiply_numbers, remove_path, set_path, values_equal},
};

fn invalid(message: impl Into<String>) -> DocumentStoreError {
    DocumentStoreError::InvalidQuery(message.into())
}

fn fields<'a>(operator: &str, argument: &'a Bson) -> DocumentStoreResult<&'a Document> {
    match argument {
        Bson::Document(fields) => Ok(fields),
        _ => Err(invalid(format!("{operator} needs a document of fields"))),
    }
}

const SUPPORTED: &[&str] = &[
    "$set", "$setOnInsert", "$unset", "$inc", "$mul", "$min", "$max", "$push", "$addToSet", "$pull", "$rename",
];

/// Applies every operator of `update` to `document`.
///
/// Operators run in the order they appear. Modifying `_id` is rejected.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> DocumentStoreResult<()> {
    for (operator, argument) in update {
        if !SUPPORTED.contains(&operator.as_str()) {
            return Err(invalid(format!("unsupported update operator {operator}")));
        }
        let fields = fields(operator, argument)?;

        if fields.keys().any(|path| path == ID_FIELD || path.starts_with("_id.")) && operator != "$setOnInsert" {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "{operator} cannot modify the immutable field '{ID_FIELD}'"
            )));
        }

        for (path, value) in fields {
            match operator.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$setOnInsert" => {}
                "$unset" => {
                    remove_path(document, path);
                }
                "$inc" => arithmetic(document, operator, path, value, add_numbers)?,
                "$mul" => arithmetic(document, operator, path, value, multiply_numbers)?,
                "$min" => keep_if(document, path, value, Ordering::Less)?,
                "$max" => keep_if(document, path, value, Ordering::Greater)?,
                "$push" => push(document, path, value, false)?,
                "$addToSet" => push(document, path, value, true)?,
                "$pull" => pull(document, path, value)?,
                "$rename" => rename(document, path, value)?,
                other => return Err(invalid(format!("unsupported update operator {other}"))),
            }
        }
    }

    Ok(())
}

fn arithmetic(
    document: &mut Document,
    operator: &str,
    path: &str,
    operand: &Bson,
    combine: fn(&Bson, &Bson) -> Option<Bson>,
) -> DocumentStoreResult<()> {
    // A missing field counts as zero.
    let current = get_path(document, path).cloned().unwrap_or(Bson::Int32(0));

    let result = combine(&current, operand)
        .ok_or_else(|| invalid(format!("{operator} cannot apply to non-numeric field '{path}'")))?;

    set_path(document, path, result)
}

fn keep_if(document: &mut Document, path: &str, candidate: &Bson, wanted: Ordering) -> DocumentStoreResult<()> {
    let replace = match get_path(document, path) {
        Some(current) => compare(candidate, current) == wanted,
        None => true,
    };

    if replace {
        set_path(document, path, candidate.clone())?;
    }

    Ok(())
}

fn each_values(value: &Bson) -> Vec<Bson> {
    match value {
        Bson::Document(modifiers) if modifiers.contains_key("$each") => match modifiers.get("$each") {
            Some(Bson::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        },
        other => vec![other.clone()],
    }
}

fn push(document: &mut Document, path: &str, value: &Bson, unique: bool) -> DocumentStoreResult<()> {
    if get_path(document, path).is_none() {
        set_path(document, path, Bson::Array(Vec::new()))?;
    }

    let Some(Bson::Array(items)) = get_path_mut(document, path) else {
        return Err(invalid(format!("cannot push to non-array field '{path}'")));
    };

    for value in each_values(value) {
        if unique && items.iter().any(|existing| values_equal(existing, &value)) {
            continue;
        }
        items.push(value);
    }

    Ok(())
}

fn pull(document: &mut Document, path: &str, condition: &Bson) -> DocumentStoreResult<()> {
    let Some(target) = get_path_mut(document, path) else {
        return Ok(());
    };
    let Bson::Array(items) = target else {
        return Err(invalid(format!("cannot pull from non-array field '{path}'")));
    };

    let mut kept = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !matches_condition(&item, condition)? {
            kept.push(item);
        }
    }
    *items = kept;

    Ok(())
}

fn rename(document: &mut Document, path: &str, target: &Bson) -> DocumentStoreResult<()> {
    let Bson::String(target) = target else {
        return Err(invalid("$rename needs a string target"));
    };
    if target == ID_FIELD {
        return Err(DocumentStoreError::InvalidDocument(format!(
            "$rename cannot target the immutable field '{ID_FIELD}'"
        )));
    }

    if let Some(value) = remove_path(document, path) {
        set_path(document, target, value)?;
    }

    Ok(())
}
