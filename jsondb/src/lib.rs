//! Embedded JSON document store.
//!
//! A collection is one JSON file holding an array of objects, loaded into
//! memory and written back on [`Collection::commit`]. Unique fields and the
//! auto-increment `_id` counter live in a SQLite sidecar next to it and are
//! persisted as soon as they change.
//!
//! Single process, single writer: there is no locking, and the last commit
//! to a path wins.

pub mod codec;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod index;
pub mod query;
pub mod store;
pub mod validation;

pub use config::OpenOptions;
pub use database::Database;
pub use document::Document;
pub use error::{JsonDbError, Result};
pub use index::{Conflict, IndexRegistry};
pub use query::Filter;
pub use store::Collection;
pub use validation::ValidationResult;
