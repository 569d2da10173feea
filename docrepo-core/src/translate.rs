//! Translation of typed predicates and update specifications into native documents.
//!
//! Native filters and updates pass through unchanged; typed predicates are visited into
//! the MongoDB query dialect. Every backend receives only the translated form.

use bson::{Bson, Document, doc};

use crate::{
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Criteria, Expr, FieldOp, QueryVisitor},
    update::Update,
};

/// A translated update instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeUpdate {
    /// Replace the matched document with this one.
    Replace(Document),
    /// Apply these update operators to matched documents.
    Modify(Document),
}

/// Translates typed predicates into native query documents.
pub struct FilterTranslator;

impl FilterTranslator {
    fn comparison(op: &str, value: &Bson) -> Document {
        let mut comparison = Document::new();
        comparison.insert(op, value.clone());
        comparison
    }

    fn string_operand<'v>(op: &FieldOp, value: &'v Bson) -> Result<&'v str, DocumentStoreError> {
        match value {
            Bson::String(s) => Ok(s),
            _ => Err(DocumentStoreError::InvalidQuery(format!(
                "{op:?} operator requires a string value"
            ))),
        }
    }
}

impl QueryVisitor for FilterTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    // `$not` is only valid at field level, so whole expressions are negated with `$nor`.
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => Self::comparison("$eq", value),
                FieldOp::Ne => Self::comparison("$ne", value),
                FieldOp::Gt => Self::comparison("$gt", value),
                FieldOp::Gte => Self::comparison("$gte", value),
                FieldOp::Lt => Self::comparison("$lt", value),
                FieldOp::Lte => Self::comparison("$lte", value),
                FieldOp::Contains => match value {
                    Bson::Array(values) => doc! { "$all": values.clone() },
                    _ => doc! { "$regex": escape_regex(Self::string_operand(op, value)?) },
                },
                FieldOp::NotContains => match value {
                    Bson::Array(values) => doc! { "$nin": values.clone() },
                    _ => doc! { "$not": { "$regex": escape_regex(Self::string_operand(op, value)?) } },
                },
                FieldOp::StartsWith => doc! {
                    "$regex": format!("^{}", escape_regex(Self::string_operand(op, value)?)),
                },
                FieldOp::EndsWith => doc! {
                    "$regex": format!("{}$", escape_regex(Self::string_operand(op, value)?)),
                },
                FieldOp::AnyOf => Self::comparison("$in", &as_array(value)),
                FieldOp::NoneOf => Self::comparison("$nin", &as_array(value)),
            }
        })
    }
}

fn as_array(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        other => Bson::Array(vec![other.clone()]),
    }
}

/// Escapes regular expression metacharacters so the input matches literally.
pub fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());

    for c in input.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

/// Translates any filter form into a native filter document.
pub fn to_native_filter(criteria: &Criteria) -> DocumentStoreResult<Document> {
    match criteria {
        Criteria::All => Ok(Document::new()),
        Criteria::Expr(expr) => FilterTranslator.visit_expr(expr),
        Criteria::Native(document) => Ok(document.clone()),
    }
}

/// Native filter selecting a single document by its key.
pub fn id_filter(id: Bson) -> Document {
    doc! { ID_FIELD: id }
}

/// Translates any update form into a native update instruction.
///
/// Replacements are returned without `_id`; the stored key is re-attached by
/// [`replacement_for`] so it can never be altered by a replace.
pub fn to_native_update(update: Update) -> DocumentStoreResult<NativeUpdate> {
    match update {
        Update::Replace(mut document) => {
            document.remove(ID_FIELD);
            Ok(NativeUpdate::Replace(document))
        }
        Update::Set { field, value } => {
            if field == ID_FIELD {
                return Err(DocumentStoreError::InvalidQuery(
                    "the _id field cannot be updated".to_string(),
                ));
            }

            let mut fields = Document::new();
            fields.insert(field, value);

            Ok(NativeUpdate::Modify(doc! { "$set": fields }))
        }
        Update::Native(document) => {
            if document.is_empty() {
                return Err(DocumentStoreError::InvalidQuery(
                    "update document is empty".to_string(),
                ));
            }
            if let Some(key) = document.keys().find(|key| !key.starts_with('$')) {
                return Err(DocumentStoreError::InvalidQuery(format!(
                    "update document must only contain operators, found '{key}'"
                )));
            }

            Ok(NativeUpdate::Modify(document))
        }
    }
}

/// Builds the replacement for a document identified by `id`, carrying the original key.
pub fn replacement_for(id: Bson, mut replacement: Document) -> Document {
    replacement.insert(ID_FIELD, id);
    replacement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Field, Filter};

    #[test]
    fn field_comparison_translates_to_operator() {
        let native = to_native_filter(&Filter::eq("SomeContent", "X").into()).unwrap();

        assert_eq!(native, doc! { "SomeContent": { "$eq": "X" } });
    }

    #[test]
    fn logical_operators_nest() {
        let expr = Field::new("a").gt(1).and(Field::new("b").lt(5)).not();
        let native = to_native_filter(&expr.into()).unwrap();

        assert_eq!(
            native,
            doc! { "$nor": [ { "$and": [ { "a": { "$gt": 1 } }, { "b": { "$lt": 5 } } ] } ] }
        );
    }

    #[test]
    fn string_operators_escape_input() {
        let native = to_native_filter(&Filter::starts_with("name", "a.b").into()).unwrap();

        assert_eq!(native, doc! { "name": { "$regex": "^a\\.b" } });
    }

    #[test]
    fn string_operator_rejects_non_string() {
        let result = to_native_filter(&Filter::ends_with("name", 4).into());

        assert!(matches!(result, Err(DocumentStoreError::InvalidQuery(_))));
    }

    #[test]
    fn native_filter_passes_through() {
        let filter = doc! { "a": { "$in": [1, 2] } };

        assert_eq!(to_native_filter(&filter.clone().into()).unwrap(), filter);
    }

    #[test]
    fn any_of_wraps_scalar() {
        let native = to_native_filter(&Expr::field("a".into(), FieldOp::AnyOf, Bson::Int32(3)).into()).unwrap();

        assert_eq!(native, doc! { "a": { "$in": [3] } });
    }

    #[test]
    fn set_update_targets_nested_path() {
        let native = to_native_update(Update::set("Nested.SomeDate", 5)).unwrap();

        assert_eq!(native, NativeUpdate::Modify(doc! { "$set": { "Nested.SomeDate": 5 } }));
    }

    #[test]
    fn replacement_drops_and_restores_id() {
        let native = to_native_update(Update::Replace(doc! { "_id": 9, "a": 1 })).unwrap();

        let NativeUpdate::Replace(document) = native else {
            panic!("expected replacement");
        };
        assert_eq!(document, doc! { "a": 1 });
        assert_eq!(replacement_for(Bson::Int32(1), document), doc! { "a": 1, "_id": 1 });
    }

    #[test]
    fn native_update_requires_operators() {
        let result = to_native_update(Update::Native(doc! { "a": 1 }));

        assert!(matches!(result, Err(DocumentStoreError::InvalidQuery(_))));
    }

    #[test]
    fn setting_id_is_rejected() {
        assert!(to_native_update(Update::set("_id", 1)).is_err());
    }
}
