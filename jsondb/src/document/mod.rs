//! Document helpers: field lookup and the missing-value rule used by unique indexes.

use serde_json::{Map, Value};

/// One record of a collection: an ordered JSON object with no fixed schema.
pub type Document = Map<String, Value>;

/// Reserved field holding auto-generated identifiers.
pub const ID_FIELD: &str = "_id";

/// Look up a field, following dots into nested objects (`"author.name"`).
/// A key containing a literal dot is matched first.
pub fn get_field<'a>(doc: &'a Document, field: &str) -> Option<&'a Value> {
    if let Some(value) = doc.get(field) {
        return Some(value);
    }
    if !field.contains('.') {
        return None;
    }

    let mut parts = field.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// The value a unique index sees for `field`, or `None` when the field is
/// absent or null. Missing values never collide with each other.
pub fn indexed_value<'a>(doc: &'a Document, field: &str) -> Option<&'a Value> {
    match get_field(doc, field) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value),
    }
}

/// Convert an arbitrary JSON value into a document, if it is an object.
pub fn from_value(value: Value) -> Option<Document> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Largest integer `_id` among `documents`. Non-integer ids (strings, objects)
/// are ignored.
pub fn max_id(documents: &[Document]) -> Option<i64> {
    documents
        .iter()
        .filter_map(|d| d.get(ID_FIELD).and_then(Value::as_i64))
        .max()
}

/// Build a document from a `json!` literal. Non-objects yield an empty document.
pub fn doc(value: Value) -> Document {
    from_value(value).unwrap_or_default()
}
