//! Native projection documents applied to stored documents.
//!
//! A projection is either inclusive (`{field: 1}` and computed `{alias: "$path"}` entries)
//! or exclusive (`{field: 0}`). `_id` is kept unless excluded explicitly and is the only field
//! allowed to be excluded from an inclusive projection.

use bson::{Bson, Document};

use docrepo_core::{
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::{
    aggregate::evaluate_expression,
    value::{get_path, is_truthy, remove_path, set_path},
};

enum Entry<'a> {
    Include,
    Exclude,
    Computed(&'a Bson),
}

fn classify(value: &Bson) -> Entry<'_> {
    match value {
        Bson::Boolean(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
            if is_truthy(value) {
                Entry::Include
            } else {
                Entry::Exclude
            }
        }
        computed => Entry::Computed(computed),
    }
}

/// Applies `projection` to `document`, returning the projected copy.
pub(crate) fn project(document: &Document, projection: &Document) -> DocumentStoreResult<Document> {
    if projection.is_empty() {
        return Ok(document.clone());
    }

    let mut include_id = true;
    let mut inclusive = false;
    let mut exclusive = false;

    for (field, value) in projection {
        match classify(value) {
            Entry::Exclude if field == ID_FIELD => include_id = false,
            Entry::Exclude => exclusive = true,
            Entry::Include | Entry::Computed(_) => inclusive = true,
        }
    }

    if inclusive && exclusive {
        return Err(DocumentStoreError::InvalidQuery(
            "cannot mix inclusion and exclusion in one projection".to_string(),
        ));
    }

    if !inclusive {
        let mut projected = document.clone();
        for (field, value) in projection {
            if matches!(classify(value), Entry::Exclude) {
                remove_path(&mut projected, field);
            }
        }
        return Ok(projected);
    }

    let mut projected = Document::new();

    if include_id {
        if let Some(id) = document.get(ID_FIELD) {
            projected.insert(ID_FIELD, id.clone());
        }
    }

    for (field, value) in projection {
        match classify(value) {
            Entry::Include if field != ID_FIELD => {
                if let Some(found) = get_path(document, field) {
                    set_path(&mut projected, field, found.clone())?;
                }
            }
            Entry::Computed(expression) => {
                if let Some(computed) = evaluate_expression(document, expression)? {
                    set_path(&mut projected, field, computed)?;
                }
            }
            _ => {}
        }
    }

    Ok(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn source() -> Document {
        doc! { "_id": 7, "Name": "a", "Nested": { "SomeValue": 3, "Other": 1 }, "Extra": true }
    }

    #[test]
    fn inclusion_keeps_id_and_listed_fields() {
        let projected = project(&source(), &doc! { "Name": 1, "Nested.SomeValue": 1 }).unwrap();

        assert_eq!(projected, doc! { "_id": 7, "Name": "a", "Nested": { "SomeValue": 3 } });
    }

    #[test]
    fn inclusion_can_drop_id_and_alias_fields() {
        let projected = project(&source(), &doc! { "_id": 0, "Value": "$Nested.SomeValue" }).unwrap();

        assert_eq!(projected, doc! { "Value": 3 });
    }

    #[test]
    fn exclusion_removes_listed_fields() {
        let projected = project(&source(), &doc! { "Nested": 0, "Extra": false }).unwrap();

        assert_eq!(projected, doc! { "_id": 7, "Name": "a" });
    }

    #[test]
    fn mixing_modes_is_rejected() {
        assert!(project(&source(), &doc! { "Name": 1, "Extra": 0 }).is_err());
    }
}
