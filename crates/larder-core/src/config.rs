//! Construction-time options for a table handle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Construction-time options for [`Table`](crate::Table).
///
/// Options are immutable for the lifetime of the handle they create.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct TableOptions {
    /// Name of the backing table.
    pub table_name: String,
    /// Directory holding the database file. Created if missing.
    pub dir: PathBuf,
    /// Database file name inside `dir`.
    pub filename: String,
    /// Column name -> declared SQL type. Consulted only when the table does
    /// not exist yet; an existing table keeps its schema.
    pub columns: BTreeMap<String, String>,
    /// Whether to mirror materialized rows in the in-process cache.
    pub caching: bool,
    /// Load every row into the cache at construction. Requires `caching`.
    pub fetch_all: bool,
    /// Switch the database to write-ahead-log journaling before any other
    /// statement runs.
    pub wal: bool,
}

impl TableOptions {
    /// Default table name.
    pub const DEFAULT_TABLE_NAME: &'static str = "database";
    /// Default storage directory.
    pub const DEFAULT_DIR: &'static str = "./data";
    /// Default database file name.
    pub const DEFAULT_FILENAME: &'static str = "sqlite.db";

    /// Create options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backing table name.
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Set the storage directory.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Set the database file name.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Add one column to the creation schema.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        decl_type: impl Into<String>,
    ) -> Self {
        self.columns.insert(name.into(), decl_type.into());
        self
    }

    /// Replace the creation schema.
    pub fn with_columns(mut self, columns: BTreeMap<String, String>) -> Self {
        self.columns = columns;
        self
    }

    /// Enable or disable the in-process row cache.
    ///
    /// Default: `true`
    pub fn with_caching(mut self, enable: bool) -> Self {
        self.caching = enable;
        self
    }

    /// Enable or disable eager cache loading at construction.
    ///
    /// Default: `false`
    pub fn with_fetch_all(mut self, enable: bool) -> Self {
        self.fetch_all = enable;
        self
    }

    /// Enable or disable write-ahead-log journaling.
    ///
    /// Default: `false`
    pub fn with_wal(mut self, enable: bool) -> Self {
        self.wal = enable;
        self
    }

    /// Full path of the database file.
    pub fn db_path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            table_name: Self::DEFAULT_TABLE_NAME.to_string(),
            dir: PathBuf::from(Self::DEFAULT_DIR),
            filename: Self::DEFAULT_FILENAME.to_string(),
            columns: BTreeMap::new(),
            caching: true,
            fetch_all: false,
            wal: false,
        }
    }
}
