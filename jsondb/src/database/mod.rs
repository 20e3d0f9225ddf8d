use crate::codec;
use crate::config::OpenOptions;
use crate::error::{JsonDbError, Result};
use crate::store::Collection;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A directory of collections, one `<name>.json` file each.
pub struct Database {
    root: PathBuf,
    collections: BTreeMap<String, PathBuf>,
    options: OpenOptions,
}

impl Database {
    /// Open the directory at `path` and discover the collections in it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(path, OpenOptions::default())
    }

    pub fn with_options(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.exists() {
            return Err(JsonDbError::Path(format!(
                "Data directory does not exist: {}",
                root.display()
            )));
        }
        if !root.is_dir() {
            return Err(JsonDbError::Path(format!(
                "Expected a data directory, found a file: {}",
                root.display()
            )));
        }

        let mut db = Database {
            root,
            collections: BTreeMap::new(),
            options,
        };
        db.scan()?;
        Ok(db)
    }

    /// Re-read the directory listing.
    pub fn scan(&mut self) -> Result<()> {
        let pattern = format!("{}/*.json", glob::Pattern::escape(&self.root.to_string_lossy()));
        let files = glob::glob(&pattern)
            .map_err(|e| JsonDbError::Path(format!("Glob error: {e}")))?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file());

        self.collections.clear();
        for file in files {
            if let Some(stem) = file.file_stem() {
                self.collections
                    .insert(stem.to_string_lossy().to_string(), file);
            }
        }
        log::debug!(
            "Found {} collection(s) in {}",
            self.collections.len(),
            self.root.display()
        );
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of known collections, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.collections.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Open an existing collection.
    pub fn get(&self, name: &str) -> Result<Collection> {
        let path = self.collections.get(name).ok_or_else(|| {
            JsonDbError::Path(format!(
                "Collection '{name}' not found in {}",
                self.root.display()
            ))
        })?;
        self.options.clone().create(false).open(path)
    }

    /// Create `name` as an empty collection, replacing any existing documents.
    /// The index sidecar, if one exists, is kept.
    pub fn create(&mut self, name: &str) -> Result<Collection> {
        validate_name(name)?;
        let path = self.root.join(format!("{name}.json"));
        codec::write_in_place(&path, &codec::encode_documents(&[], false)?)?;
        self.collections.insert(name.to_string(), path.clone());
        self.options.open(&path)
    }

    /// Drop the collection's files and forget it.
    pub fn drop(&mut self, collection: Collection) -> Result<()> {
        let name = collection.name().to_string();
        collection.drop()?;
        self.collections.remove(&name);
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(JsonDbError::Path(format!(
            "Invalid collection name: '{name}'"
        )));
    }
    Ok(())
}
