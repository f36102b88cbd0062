//! Scalar row transformation for the row-creation pass.
//!
//! Only attributes classified as scalar become columns here; relation,
//! component and attachment columns are owned by the link pass and are
//! never set by the transform.

use serde_json::Value;

use crate::catalog::{LinkKind, Model};
use crate::sink::{SqlRow, SqlValue};

/// Document bookkeeping fields kept by the relational schema.
const TIMESTAMP_COLUMNS: &[(&str, &str)] = &[("createdAt", "created_at"), ("updatedAt", "updated_at")];

/// Build the scalar row for one document.
pub fn transform_document(doc: &Value, model: &Model) -> SqlRow {
    let mut row = SqlRow::new();

    for (name, attr) in &model.attributes {
        if !matches!(attr.link, LinkKind::Scalar) {
            continue;
        }
        let Some(value) = doc.get(name) else {
            continue;
        };
        if let Some(value) = scalar_value(value) {
            row.push((name.clone(), value));
        }
    }

    for (doc_key, column) in TIMESTAMP_COLUMNS {
        if let Some(value) = doc.get(*doc_key).and_then(scalar_value) {
            row.push(((*column).to_string(), value));
        }
    }

    row
}

/// Map a document value to a SQL parameter, unwrapping export-format
/// scalar wrappers (`$oid`, `$date`, `$numberLong`, ...).
pub fn scalar_value(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Null => Some(SqlValue::Null),
        Value::Bool(b) => Some(SqlValue::Bool(*b)),
        Value::Number(n) => Some(number_value(n)),
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Object(map) => {
            if let Some(oid) = map.get("$oid").and_then(Value::as_str) {
                return Some(SqlValue::Text(oid.to_string()));
            }
            if let Some(date) = map.get("$date") {
                return match date {
                    Value::String(s) => Some(SqlValue::Text(s.clone())),
                    other => scalar_value(other),
                };
            }
            if let Some(n) = map.get("$numberLong").and_then(Value::as_str) {
                return n.parse().ok().map(SqlValue::Integer);
            }
            if let Some(n) = map.get("$numberDouble").and_then(Value::as_str) {
                return n.parse().ok().map(SqlValue::Real);
            }
            if let Some(n) = map.get("$numberDecimal").and_then(Value::as_str) {
                return Some(SqlValue::Text(n.to_string()));
            }
            // json-typed fields keep their serialized form
            Some(SqlValue::Text(value.to_string()))
        }
        Value::Array(_) => Some(SqlValue::Text(value.to_string())),
    }
}

fn number_value(n: &serde_json::Number) -> SqlValue {
    if let Some(i) = n.as_i64() {
        SqlValue::Integer(i)
    } else if let Some(f) = n.as_f64() {
        SqlValue::Real(f)
    } else {
        SqlValue::Text(n.to_string())
    }
}
