use crate::error::Result;
use crate::store::Collection;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a collection is opened and written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOptions {
    /// Create the collection file (as `[]`) when it does not exist.
    pub create: bool,
    /// Commit through a temporary file and rename instead of truncating in place.
    pub atomic_writes: bool,
    /// Indent the collection file on commit.
    pub pretty: bool,
    /// Extension of the index sidecar written next to the collection file.
    pub index_extension: String,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            create: true,
            atomic_writes: true,
            pretty: false,
            index_extension: "index".to_string(),
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn atomic_writes(mut self, atomic: bool) -> Self {
        self.atomic_writes = atomic;
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn index_extension(mut self, extension: &str) -> Self {
        self.index_extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Open the collection at `path` with these options.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Collection> {
        Collection::open_with(path, self.clone())
    }
}
