use crate::codec;
use crate::document::{indexed_value, Document, ID_FIELD};
use crate::error::{JsonDbError, Result};
use crate::validation::{check_unique_fields, ValidationResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Unique-field constraints and the `_id` counter of one collection.
///
/// State lives in a SQLite sidecar next to the collection file and every
/// mutation is written through immediately. Document data, on the other
/// hand, is only durable after `Collection::commit`, so an `_id` handed out
/// by an insert that is never committed is lost but never reissued.
pub struct IndexRegistry {
    conn: Connection,
    path: Option<PathBuf>,
    name: String,
    fields: BTreeSet<String>,
    counter: Option<i64>,
}

/// A unique field that a candidate document would violate.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub field: String,
    pub documents: Vec<Document>,
}

impl IndexRegistry {
    /// Open or create the sidecar at `path` for the collection `name`.
    ///
    /// Only a new (absent or zero-byte) sidecar is seeded with an empty field
    /// set; an existing one without an entry for `name` is corrupt.
    pub fn open(path: &Path, name: &str) -> Result<Self> {
        let fresh = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let conn = Connection::open(path)?;
        Self::from_connection(conn, Some(path.to_path_buf()), name, fresh).map_err(|e| match e {
            JsonDbError::Sqlite(err) => JsonDbError::corrupt(path.display(), err.to_string()),
            other => other,
        })
    }

    /// Open an in-memory registry (for testing).
    pub fn open_in_memory(name: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None, name, true)
    }

    fn from_connection(
        conn: Connection,
        path: Option<PathBuf>,
        name: &str,
        fresh: bool,
    ) -> Result<Self> {
        let mut registry = IndexRegistry {
            conn,
            path,
            name: name.to_string(),
            fields: BTreeSet::new(),
            counter: None,
        };
        registry.initialize_tables()?;
        registry.load(fresh)?;
        Ok(registry)
    }

    fn initialize_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS index_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(())
    }

    fn load(&mut self, fresh: bool) -> Result<()> {
        match self.get_entry(&self.name)? {
            Some(text) => self.fields = codec::decode_fields(&text, &self.source())?,
            None if fresh => {
                let empty = codec::encode_fields(&self.fields)?;
                self.put_entry(&self.name, &empty)?;
            }
            None => {
                return Err(JsonDbError::corrupt(
                    self.source(),
                    format!("no unique field entry for '{}'", self.name),
                ))
            }
        }

        self.counter = match self.get_entry(ID_FIELD)? {
            Some(text) => Some(codec::decode_counter(&text, &self.source())?),
            None => None,
        };
        if self.assigns_ids() && self.counter.is_none() {
            return Err(JsonDbError::corrupt(
                self.source(),
                format!("'{ID_FIELD}' is unique but has no counter"),
            ));
        }

        log::debug!(
            "Loaded index for '{}': fields={:?} counter={:?}",
            self.name,
            self.fields,
            self.counter
        );
        Ok(())
    }

    fn get_entry(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .conn
            .query_row(
                "SELECT value FROM index_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    fn put_entry(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO index_entries (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn source(&self) -> String {
        match &self.path {
            Some(p) => p.display().to_string(),
            None => format!("{} (in-memory index)", self.name),
        }
    }

    /// Collection name the field set is keyed by.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sidecar file location, `None` for in-memory registries.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn is_unique(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Whether inserts should be assigned fresh `_id`s.
    pub fn assigns_ids(&self) -> bool {
        self.is_unique(ID_FIELD)
    }

    // ── Unique fields ────────────────────────────────────────────────

    /// Add `field` to the unique set. Declaring `_id` creates the counter at 0
    /// unless one already exists. Re-declaring a field is a no-op.
    pub fn declare_unique(&mut self, field: &str) -> Result<()> {
        if self.fields.contains(field) {
            return Ok(());
        }

        let mut fields = self.fields.clone();
        fields.insert(field.to_string());
        let encoded = codec::encode_fields(&fields)?;
        let init_counter = field == ID_FIELD && self.counter.is_none();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO index_entries (key, value) VALUES (?1, ?2)",
            params![self.name, encoded],
        )?;
        if init_counter {
            tx.execute(
                "INSERT OR REPLACE INTO index_entries (key, value) VALUES (?1, ?2)",
                params![ID_FIELD, codec::encode_counter(0)],
            )?;
        }
        tx.commit()?;

        self.fields = fields;
        if init_counter {
            self.counter = Some(0);
        }
        log::debug!("Declared unique field '{field}' on '{}'", self.name);
        Ok(())
    }

    /// Remove `field` from the unique set. The counter is kept so ids are
    /// never reissued if `_id` is declared again. Returns whether the field
    /// was declared.
    pub fn drop_unique(&mut self, field: &str) -> Result<bool> {
        if !self.fields.contains(field) {
            return Ok(false);
        }

        let mut fields = self.fields.clone();
        fields.remove(field);
        self.put_entry(&self.name, &codec::encode_fields(&fields)?)?;
        self.fields = fields;
        Ok(true)
    }

    /// Find the first unique field on which `candidate` collides with one of
    /// `existing`. Fields are checked in sorted order; fields missing from the
    /// candidate never collide.
    pub fn check_duplicate(&self, existing: &[Document], candidate: &Document) -> Option<Conflict> {
        for field in &self.fields {
            let Some(value) = indexed_value(candidate, field) else {
                continue;
            };

            let documents: Vec<Document> = existing
                .iter()
                .filter(|doc| indexed_value(doc, field) == Some(value))
                .cloned()
                .collect();

            if !documents.is_empty() {
                return Some(Conflict {
                    field: field.clone(),
                    documents,
                });
            }
        }
        None
    }

    // ── Id counter ───────────────────────────────────────────────────

    /// Current counter value, `None` when `_id` was never declared.
    pub fn current_id(&self) -> Option<i64> {
        self.counter
    }

    /// Advance the counter by one and return the new value.
    pub fn next_id(&mut self) -> Result<i64> {
        self.increment(1)
    }

    pub fn increment(&mut self, step: i64) -> Result<i64> {
        let value = self.require_counter()? + step;
        self.store_counter(value)?;
        Ok(value)
    }

    pub fn decrement(&mut self, step: i64) -> Result<i64> {
        let value = self.require_counter()? - step;
        self.store_counter(value)?;
        Ok(value)
    }

    /// Overwrite the counter. Only reindexing should move it backwards.
    pub fn reset_counter(&mut self, value: i64) -> Result<()> {
        self.store_counter(value)
    }

    pub(crate) fn require_counter(&self) -> Result<i64> {
        self.counter.ok_or_else(|| {
            JsonDbError::corrupt(
                self.source(),
                format!("no '{ID_FIELD}' counter for '{}'", self.name),
            )
        })
    }

    fn store_counter(&mut self, value: i64) -> Result<()> {
        self.put_entry(ID_FIELD, &codec::encode_counter(value))?;
        self.counter = Some(value);
        Ok(())
    }

    // ── Validation ───────────────────────────────────────────────────

    /// Count distinct values of every unique field without failing.
    pub fn report(&self, documents: &[Document]) -> ValidationResult {
        check_unique_fields(&self.fields, documents, self.counter)
    }

    /// Fail with `IndexValidation` if any unique field holds duplicates,
    /// e.g. after the collection file was edited by hand.
    pub fn validate(&self, documents: &[Document]) -> Result<ValidationResult> {
        let result = self.report(documents);
        if let Some(violation) = result.first_violation() {
            return Err(JsonDbError::IndexValidation {
                field: violation.field.clone(),
                distinct: violation.distinct,
                total: violation.present,
            });
        }
        Ok(result)
    }

    /// Close the sidecar and delete it from disk.
    pub(crate) fn destroy(self) -> Result<()> {
        let IndexRegistry { conn, path, .. } = self;
        conn.close().map_err(|(_, e)| e)?;
        if let Some(path) = path {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Sidecar location for a collection file: same directory, same stem,
/// `extension` in place of `.json`.
pub fn sidecar_path(collection_path: &Path, extension: &str) -> PathBuf {
    collection_path.with_extension(extension)
}
