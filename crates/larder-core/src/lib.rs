//! Larder - a cached single-table convenience layer over SQLite.
//!
//! This crate provides object-shaped get/set/has/ensure/delete operations
//! backed by one relational table, plus an optional in-process read cache
//! that mirrors previously seen rows.
//!
//! # Example
//!
//! ```rust,ignore
//! use larder::{Table, TableOptions};
//! use serde_json::json;
//!
//! fn main() -> larder::Result<()> {
//!     let table = Table::open(
//!         TableOptions::new()
//!             .with_table_name("foods")
//!             .with_column("name", "text")
//!             .with_column("price", "int"),
//!     )?;
//!
//!     table.set(json!({"name": "apple", "price": 3}).as_object().cloned().unwrap())?;
//!
//!     // Served from the cache, no second store round trip.
//!     let apple = table.get("name", "apple")?;
//!     println!("{:?}", apple);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod statement;
pub mod table;

// Re-export commonly used types
pub use cache::RowCache;
pub use config::TableOptions;
pub use error::{LarderError, Result};
pub use statement::{build_write_statement, BuiltStatement, RowIntent};
pub use table::{ChangeCallback, Table, TableStats};

/// A row: column name mapped to a scalar or structured JSON value.
///
/// Keys iterate in sorted order, which fixes the column order of generated
/// SQL statements.
pub type Row = serde_json::Map<String, serde_json::Value>;
