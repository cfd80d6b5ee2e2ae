//! Durable task catalogue (SQLite via sqlx).
//!
//! Keyed by `(url, dest_folder)`. `init` creates the base table and applies
//! forward migrations by adding missing columns; a legacy JSON snapshot is
//! imported once into an empty table.

mod db;
mod json_import;
mod types;

pub use db::TaskStore;
pub use json_import::import_legacy_json;
pub use types::{MediaBlob, TaskRecord};
