use crate::codec;
use crate::config::OpenOptions;
use crate::document::{max_id, Document, ID_FIELD};
use crate::error::{JsonDbError, Result};
use crate::index::{sidecar_path, Conflict, IndexRegistry};
use crate::query;
use crate::validation::ValidationResult;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// One collection: an ordered list of documents held in memory and backed
/// by a single JSON file, plus its index registry.
///
/// Mutations only touch memory. `commit` is the single point where the
/// document list is written back; the registry persists on its own.
pub struct Collection {
    path: PathBuf,
    name: String,
    documents: Vec<Document>,
    index: IndexRegistry,
    options: OpenOptions,
}

impl Collection {
    /// Open the collection file at `path`, creating it as `[]` if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_collection_path(&path)?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| {
                JsonDbError::Path(format!("No collection name in path: {}", path.display()))
            })?;

        let index_path = sidecar_path(&path, &options.index_extension);
        if index_path == path {
            return Err(JsonDbError::Path(format!(
                "Collection file and index sidecar are the same file: {}",
                path.display()
            )));
        }

        let exists = path.exists();
        if !exists && !options.create {
            return Err(JsonDbError::Path(format!(
                "Collection file does not exist: {}",
                path.display()
            )));
        }
        let documents = if exists {
            codec::read_documents(&path)?
        } else {
            Vec::new()
        };

        let index = IndexRegistry::open(&index_path, &name)?;

        if !exists {
            codec::write_in_place(&path, &codec::encode_documents(&[], false)?)?;
            log::debug!("Created collection file {}", path.display());
        }

        log::debug!(
            "Opened collection '{name}' with {} document(s) from {}",
            documents.len(),
            path.display()
        );

        Ok(Collection {
            path,
            name,
            documents,
            index,
            options,
        })
    }

    /// Collection name (the file stem)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The in-memory documents, including uncommitted changes.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn get(&self, position: usize) -> Option<&Document> {
        self.documents.get(position)
    }

    pub fn index(&self) -> &IndexRegistry {
        &self.index
    }

    // ── Indexes ──────────────────────────────────────────────────────

    /// Require `field` to be unique across the collection. Declaring `_id`
    /// turns on id assignment for later inserts.
    pub fn declare_unique(&mut self, field: &str) -> Result<()> {
        self.index.declare_unique(field)
    }

    pub fn drop_unique(&mut self, field: &str) -> Result<bool> {
        self.index.drop_unique(field)
    }

    /// Check unique fields against the in-memory documents.
    pub fn validate(&self) -> Result<ValidationResult> {
        self.index.validate(&self.documents)
    }

    /// Like `validate` but never fails; violations are listed in the result.
    pub fn report(&self) -> ValidationResult {
        self.index.report(&self.documents)
    }

    /// Recompute the id counter from the largest integer `_id` present.
    /// Returns the new counter, or `None` when `_id` is not declared.
    pub fn reindex(&mut self) -> Result<Option<i64>> {
        if !self.index.assigns_ids() {
            return Ok(None);
        }
        let value = max_id(&self.documents).unwrap_or(0);
        self.index.reset_counter(value)?;
        log::info!("Reindexed '{}': id counter set to {value}", self.name);
        Ok(Some(value))
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn find<P>(&self, predicate: P) -> Vec<Document>
    where
        P: Fn(&Document) -> bool,
    {
        query::select(&self.documents, predicate)
    }

    pub fn find_with_position<P>(&self, predicate: P) -> Vec<(usize, Document)>
    where
        P: Fn(&Document) -> bool,
    {
        query::select_with_position(&self.documents, predicate)
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Append a batch of documents.
    ///
    /// Every candidate is checked against the existing documents and against
    /// the candidates before it in the same batch. One conflict rejects the
    /// whole batch: nothing is appended and the id counter does not move.
    /// When `_id` is unique each document gets the next counter value.
    /// Returns the stored documents; call `commit` to persist them.
    pub fn insert(&mut self, documents: Vec<Document>) -> Result<Vec<Document>> {
        let mut batch = documents;

        let assign_ids = self.index.assigns_ids() && !batch.is_empty();
        if assign_ids {
            let base = self.index.require_counter()?;
            for (offset, doc) in (1..).zip(batch.iter_mut()) {
                doc.insert(ID_FIELD.to_string(), Value::from(base + offset));
            }
        }

        for (pos, candidate) in batch.iter().enumerate() {
            let conflict = self
                .index
                .check_duplicate(&self.documents, candidate)
                .or_else(|| self.index.check_duplicate(&batch[..pos], candidate));

            if let Some(conflict) = conflict {
                log::debug!(
                    "Rejected batch of {} for '{}': duplicate '{}'",
                    batch.len(),
                    self.name,
                    conflict.field
                );
                return Err(duplicate_entry(conflict));
            }
        }

        if assign_ids {
            self.index.increment(batch.len() as i64)?;
        }

        self.documents.extend(batch.iter().cloned());
        Ok(batch)
    }

    /// Remove every matching document and return them in collection order.
    pub fn delete<P>(&mut self, predicate: P) -> Vec<Document>
    where
        P: Fn(&Document) -> bool,
    {
        let positions = query::positions(&self.documents, predicate);

        // Back to front so the remaining positions stay valid
        let mut removed: Vec<Document> = positions
            .iter()
            .rev()
            .map(|&pos| self.documents.remove(pos))
            .collect();
        removed.reverse();
        removed
    }

    /// Replace each matching document with `transform(doc)`. A `None` or an
    /// empty document leaves the original untouched.
    ///
    /// Replacements are checked against the documents left as they are and
    /// against each other. One conflict rejects the whole update and nothing
    /// changes. Returns the number of documents replaced.
    pub fn update<F, P>(&mut self, mut transform: F, predicate: P) -> Result<usize>
    where
        F: FnMut(&Document) -> Option<Document>,
        P: Fn(&Document) -> bool,
    {
        let mut positions = Vec::new();
        let mut replacements = Vec::new();
        for pos in query::positions(&self.documents, predicate) {
            match transform(&self.documents[pos]) {
                Some(doc) if !doc.is_empty() => {
                    positions.push(pos);
                    replacements.push(doc);
                }
                _ => {}
            }
        }

        if !self.index.fields().is_empty() {
            let unchanged: Vec<Document> = self
                .documents
                .iter()
                .enumerate()
                .filter(|(pos, _)| positions.binary_search(pos).is_err())
                .map(|(_, doc)| doc.clone())
                .collect();

            for (i, candidate) in replacements.iter().enumerate() {
                let conflict = self
                    .index
                    .check_duplicate(&unchanged, candidate)
                    .or_else(|| self.index.check_duplicate(&replacements[..i], candidate));

                if let Some(conflict) = conflict {
                    log::debug!(
                        "Rejected update of {} document(s) in '{}': duplicate '{}'",
                        replacements.len(),
                        self.name,
                        conflict.field
                    );
                    return Err(duplicate_entry(conflict));
                }
            }
        }

        let replaced = replacements.len();
        for (pos, doc) in positions.into_iter().zip(replacements) {
            self.documents[pos] = doc;
        }
        Ok(replaced)
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Write the whole in-memory list to the collection file.
    pub fn commit(&self) -> Result<()> {
        self.dump(self.options.pretty)
    }

    /// Commit with an explicit choice of indentation.
    pub fn dump(&self, pretty: bool) -> Result<()> {
        let text = self.dumps(pretty)?;
        if self.options.atomic_writes {
            codec::write_atomic(&self.path, &text)?;
        } else {
            codec::write_in_place(&self.path, &text)?;
        }
        log::debug!(
            "Committed {} document(s) to {}",
            self.documents.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Serialize the in-memory list without touching the file.
    pub fn dumps(&self, pretty: bool) -> Result<String> {
        codec::encode_documents(&self.documents, pretty)
    }

    /// Discard uncommitted changes by reading the file again.
    pub fn reload(&mut self) -> Result<()> {
        if !self.path.is_file() {
            return Err(JsonDbError::Path(format!(
                "Collection file does not exist: {}",
                self.path.display()
            )));
        }
        self.documents = codec::read_documents(&self.path)?;
        Ok(())
    }

    /// Delete the collection file and its index sidecar.
    pub fn drop(self) -> Result<()> {
        let Collection {
            path, name, index, ..
        } = self;

        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        index.destroy()?;
        log::info!("Dropped collection '{name}' ({})", path.display());
        Ok(())
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn duplicate_entry(conflict: Conflict) -> JsonDbError {
    JsonDbError::DuplicateEntry {
        field: conflict.field,
        conflicts: conflict.documents,
    }
}

fn check_collection_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Err(JsonDbError::Path(format!(
            "Expected a collection file, found a directory: {}",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(JsonDbError::Path(format!(
                "Directory does not exist: {}",
                parent.display()
            )));
        }
    }
    Ok(())
}
