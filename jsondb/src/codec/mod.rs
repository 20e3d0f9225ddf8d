//! Collection file and index sidecar encodings.

use crate::document::Document;
use crate::error::{JsonDbError, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

/// Serialize a document sequence to the collection file representation.
pub fn encode_documents(documents: &[Document], pretty: bool) -> Result<String> {
    let text = if pretty {
        serde_json::to_string_pretty(documents)?
    } else {
        serde_json::to_string(documents)?
    };
    Ok(text)
}

/// Deserialize a collection file. The top level must be an array of objects;
/// a zero-byte file is read as an empty collection.
pub fn decode_documents(text: &str, path: &Path) -> Result<Vec<Document>> {
    if text.trim().is_empty() {
        log::warn!("Collection file {} is empty, treating as []", path.display());
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(text)
        .map_err(|e| JsonDbError::corrupt(path.display(), format!("invalid JSON: {e}")))?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(JsonDbError::corrupt(
                path.display(),
                format!("expected a JSON array, found {}", kind_of(&other)),
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(pos, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(JsonDbError::corrupt(
                path.display(),
                format!("element {pos} is {}, expected an object", kind_of(&other)),
            )),
        })
        .collect()
}

/// Read and decode the collection file at `path`. Bytes that are not UTF-8
/// are reported as corrupt data like any other undecodable content.
pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8(bytes)
        .map_err(|e| JsonDbError::corrupt(path.display(), format!("not UTF-8: {e}")))?;
    decode_documents(&text, path)
}

/// Encode the unique field set as a JSON list.
pub fn encode_fields(fields: &BTreeSet<String>) -> Result<String> {
    Ok(serde_json::to_string(fields)?)
}

pub fn decode_fields(text: &str, source: &str) -> Result<BTreeSet<String>> {
    serde_json::from_str::<Vec<String>>(text)
        .map(|fields| fields.into_iter().collect())
        .map_err(|e| JsonDbError::corrupt(source, format!("unique field list: {e}")))
}

pub fn encode_counter(value: i64) -> String {
    value.to_string()
}

pub fn decode_counter(text: &str, source: &str) -> Result<i64> {
    text.trim()
        .parse::<i64>()
        .map_err(|e| JsonDbError::corrupt(source, format!("id counter '{text}': {e}")))
}

/// Write `contents` to a temporary file next to `path`, then rename it over
/// the target. Readers see either the old or the new file, never a torn one.
/// An existing target keeps its permissions.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    if let Ok(metadata) = std::fs::metadata(path) {
        tmp.as_file().set_permissions(metadata.permissions())?;
    }
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| JsonDbError::Io(e.error))?;
    Ok(())
}

/// Truncate and rewrite `path` in place.
pub fn write_in_place(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)?;
    Ok(())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::doc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_encode_empty_collection() {
        assert_eq!(encode_documents(&[], false).unwrap(), "[]");
    }

    #[test]
    fn test_decode_preserves_key_order() {
        let docs = decode_documents(r#"[{"z": 1, "a": 2}]"#, Path::new("t.json")).unwrap();
        let keys: Vec<&String> = docs[0].keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_decode_zero_byte_file() {
        assert!(decode_documents("", Path::new("t.json")).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_non_array() {
        let err = decode_documents(r#"{"key": "value"}"#, Path::new("t.json")).unwrap_err();
        match err {
            JsonDbError::CorruptData { reason, .. } => assert!(reason.contains("array")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_rejects_non_object_element() {
        let err = decode_documents(r#"[{"a": 1}, 2]"#, Path::new("t.json")).unwrap_err();
        match err {
            JsonDbError::CorruptData { reason, .. } => assert!(reason.contains("element 1")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        let err = decode_documents("[{", Path::new("t.json")).unwrap_err();
        assert!(matches!(err, JsonDbError::CorruptData { .. }));
    }

    #[test]
    fn test_fields_and_counter() {
        let fields: BTreeSet<String> = ["title".to_string(), "_id".to_string()].into();
        let text = encode_fields(&fields).unwrap();
        assert_eq!(text, r#"["_id","title"]"#);
        assert_eq!(decode_fields(&text, "notes").unwrap(), fields);
        assert!(decode_fields("{}", "notes").is_err());

        assert_eq!(decode_counter(&encode_counter(42), "_id").unwrap(), 42);
        assert!(decode_counter("forty-two", "_id").is_err());
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let docs = vec![doc(json!({ "title": "first" }))];
        write_atomic(&path, &encode_documents(&docs, true).unwrap()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(decode_documents(&text, &path).unwrap(), docs);

        let leftovers = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.json");
        std::fs::write(&path, "[]").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        write_atomic(&path, "[]").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_read_documents_rejects_non_utf8() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.json");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            read_documents(&path),
            Err(JsonDbError::CorruptData { .. })
        ));
    }
}
