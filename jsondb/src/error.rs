use crate::document::Document;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JsonDbError {
    #[error("Path error: {0}")]
    Path(String),

    #[error("Corrupt data in {path}: {reason}")]
    CorruptData { path: String, reason: String },

    #[error("Duplicate entry for unique field '{field}' ({} conflicting document(s))", .conflicts.len())]
    DuplicateEntry {
        field: String,
        conflicts: Vec<Document>,
    },

    #[error("Index validation failed for '{field}': {distinct} distinct value(s) across {total} document(s)")]
    IndexValidation {
        field: String,
        distinct: usize,
        total: usize,
    },

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl JsonDbError {
    pub(crate) fn corrupt(path: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        JsonDbError::CorruptData {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, JsonDbError>;
