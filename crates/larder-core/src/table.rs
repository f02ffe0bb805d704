//! Table handle: public operations and the cache-consistency rules.
//!
//! A [`Table`] owns one backing SQLite table and one in-process row cache.
//! Reads consult the cache first; writes are built by the statement module,
//! executed inside a single transaction, and only a committed batch may
//! mutate the cache or notify the change listener.

use crate::cache::RowCache;
use crate::codec::{decode_row, decode_value, scalar_value};
use crate::config::TableOptions;
use crate::error::{LarderError, Result};
use crate::statement::{bind_value, build_write_statement, quote_ident, RowIntent};
use crate::Row;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Change listener invoked once per committed row-intent with the merged row.
pub type ChangeCallback = Arc<dyn Fn(&Row) + Send + Sync>;

/// Counters for store traffic and cache effectiveness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
    /// SQL statements executed against the backing store since open.
    pub store_statements: u64,
    /// Reads served from the cache without touching the store.
    pub cache_hits: u64,
    /// Cache scans that fell through to the store.
    pub cache_misses: u64,
    /// Rows currently mirrored in the cache.
    pub cached_rows: usize,
}

/// Handle for one table in one SQLite database file.
///
/// Configuration is immutable for the lifetime of the handle. The cache and
/// all counters are per-instance: two handles never share state, even when
/// they point at the same file, so cross-handle cache consistency is not
/// provided.
pub struct Table {
    options: TableOptions,
    conn: Arc<Mutex<Connection>>,
    cache: Mutex<RowCache>,
    change_callback: Mutex<Option<ChangeCallback>>,
    store_statements: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("options", &self.options)
            .field("store_statements", &self.store_statements)
            .field("cache_hits", &self.cache_hits)
            .field("cache_misses", &self.cache_misses)
            .finish_non_exhaustive()
    }
}

impl Table {
    /// Open (or create) the backing table described by `options`.
    ///
    /// Creates the storage directory and database file if missing. When the
    /// table does not exist yet a column schema must be supplied, otherwise
    /// construction fails with [`LarderError::SchemaRequired`].
    pub fn open(options: TableOptions) -> Result<Self> {
        if !options.dir.exists() {
            std::fs::create_dir_all(&options.dir)
                .map_err(|e| LarderError::io_with_path(e, &options.dir))?;
        }

        let db_path = options.db_path();
        let conn = Connection::open(&db_path).map_err(|e| LarderError::Database {
            message: format!("Failed to open database at {}", db_path.display()),
            source: Some(e),
        })?;

        // The journal mode must switch before any other statement so the
        // existence check and every later transaction run under WAL.
        if options.wal {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }

        let exists = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![options.table_name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        if !exists {
            if options.columns.is_empty() {
                return Err(LarderError::SchemaRequired {
                    table: options.table_name.clone(),
                });
            }
            let decls: Vec<String> = options
                .columns
                .iter()
                .map(|(name, decl_type)| format!("{} {}", quote_ident(name), decl_type))
                .collect();
            conn.execute(
                &format!(
                    "CREATE TABLE {} ({})",
                    quote_ident(&options.table_name),
                    decls.join(", ")
                ),
                [],
            )?;
            debug!(table = %options.table_name, "created table");
        }

        let table = Self {
            conn: Arc::new(Mutex::new(conn)),
            cache: Mutex::new(RowCache::new()),
            change_callback: Mutex::new(None),
            store_statements: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            options,
        };

        if table.options.fetch_all {
            if !table.options.caching {
                return Err(LarderError::ConfigConflict {
                    message: "fetch_all requires caching".to_string(),
                });
            }
            table.preload_cache()?;
        }

        Ok(table)
    }

    /// The options this handle was constructed with.
    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Fetch the first row whose `column` equals `value`.
    ///
    /// With caching enabled the cache is scanned first and a hit returns
    /// without touching the store. A miss falls through to an equality
    /// SELECT; a found row is decoded and mirrored into the cache. A missing
    /// row is `Ok(None)`, never an error.
    pub fn get(&self, column: &str, value: impl Into<Value>) -> Result<Option<Row>> {
        let value = value.into();

        if self.options.caching {
            {
                let cache = self.lock_cache()?;
                if let Some((_, cached)) = cache.find_by_column(column, &value) {
                    self.cache_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(column, "cache hit");
                    return Ok(Some(cached.clone()));
                }
            }
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let Some(row) = self.select_one(column, &value)? else {
            return Ok(None);
        };

        if self.options.caching {
            let mut cache = self.lock_cache()?;
            match cache.find_by_column(column, &value) {
                Some((position, _)) => cache.replace_at(position, row.clone()),
                None => cache.insert(row.clone()),
            }
        }

        Ok(Some(row))
    }

    /// Fetch every row in table-scan order.
    ///
    /// Does not consult or seed the cache: cache population happens at
    /// construction (`fetch_all`) or through `get`/`set` only.
    pub fn get_all(&self) -> Result<Vec<Row>> {
        self.select_all()
    }

    /// Whether a row with `column` equal to `value` exists.
    ///
    /// A boolean projection of [`get`](Self::get); shares its query plan and
    /// cache behavior.
    pub fn has(&self, column: &str, value: impl Into<Value>) -> Result<bool> {
        Ok(self.get(column, value)?.is_some())
    }

    /// Apply one row-intent and return the merged row.
    ///
    /// Accepts a [`RowIntent`] or a bare [`Row`], which normalizes into an
    /// insert intent.
    pub fn set(&self, intent: impl Into<RowIntent>) -> Result<Row> {
        let mut merged = self.set_many(vec![intent.into()])?;
        merged.pop().ok_or_else(|| LarderError::Database {
            message: "batch write returned no merged row".to_string(),
            source: None,
        })
    }

    /// Apply an ordered batch of row-intents inside one transaction.
    ///
    /// Every statement is built before anything executes, so a malformed
    /// intent fails the whole batch with the store untouched. The statements
    /// commit atomically; on any store failure the transaction rolls back
    /// and the cache is left exactly as it was. Only after commit does each
    /// intent merge into the cache and reach the change listener.
    pub fn set_many(&self, intents: Vec<RowIntent>) -> Result<Vec<Row>> {
        if intents.is_empty() {
            return Ok(Vec::new());
        }

        let statements = intents
            .iter()
            .map(|intent| build_write_statement(&self.options.table_name, intent))
            .collect::<Result<Vec<_>>>()?;

        {
            let mut conn = self.lock_conn()?;
            let tx = conn.transaction()?;
            for built in &statements {
                self.count_store_call();
                tx.execute(&built.sql, params_from_iter(built.params()))?;
            }
            tx.commit()?;
        }

        // The store accepted the batch; only now may the cache and any
        // listener observe it.
        let callback = self.lock_callback()?.clone();
        let mut merged_rows = Vec::with_capacity(intents.len());
        for intent in intents {
            let merged = self.absorb_committed(intent)?;
            if let Some(callback) = &callback {
                callback(&merged);
            }
            merged_rows.push(merged);
        }
        Ok(merged_rows)
    }

    /// Return the row found by `get`, or insert `ensure_row` and return it.
    ///
    /// The inserted row is not forced to contain `column`/`value`; keeping
    /// those consistent is the caller's responsibility.
    pub fn ensure(
        &self,
        column: &str,
        value: impl Into<Value>,
        ensure_row: Row,
    ) -> Result<Row> {
        if let Some(existing) = self.get(column, value)? {
            return Ok(existing);
        }
        self.set(RowIntent::insert(ensure_row))
    }

    /// Delete every row whose `column` equals `value`; returns the count of
    /// rows the store removed.
    ///
    /// Cache eviction uses the same field-level match: every cached row
    /// whose `column` field equals `value` is dropped.
    pub fn delete(&self, column: &str, value: impl Into<Value>) -> Result<usize> {
        let value = value.into();

        let affected = {
            let conn = self.lock_conn()?;
            let sql = format!(
                "DELETE FROM {} WHERE {} = ?1",
                quote_ident(&self.options.table_name),
                quote_ident(column),
            );
            self.count_store_call();
            conn.execute(&sql, params![bind_value(&value)])?
        };

        if self.options.caching {
            let removed = self
                .lock_cache()?
                .remove_matching(|row| row.get(column) == Some(&value));
            if removed > 0 {
                debug!(column, removed, "evicted cached rows after delete");
            }
        }

        Ok(affected)
    }

    /// Drop every cached row whose `column` field equals `value`.
    ///
    /// Returns whether anything was removed; `false` when caching is
    /// disabled. The store is not touched.
    pub fn uncache(&self, column: &str, value: impl Into<Value>) -> Result<bool> {
        if !self.options.caching {
            return Ok(false);
        }
        let value = value.into();
        let removed = self
            .lock_cache()?
            .remove_matching(|row| row.get(column) == Some(&value));
        Ok(removed > 0)
    }

    /// Empty the cache entirely. Returns `true` once cleared, `false` when
    /// caching is disabled. Idempotent.
    pub fn uncache_all(&self) -> Result<bool> {
        if !self.options.caching {
            return Ok(false);
        }
        let mut cache = self.lock_cache()?;
        cache.clear();
        Ok(cache.is_empty())
    }

    /// Values of one column across all rows, in table-scan order.
    ///
    /// Bypasses the cache entirely; values go through the same textual-JSON
    /// decode as row reads.
    pub fn indexes(&self, column: &str) -> Result<Vec<Value>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {} FROM {}",
            quote_ident(column),
            quote_ident(&self.options.table_name),
        );
        let mut stmt = conn.prepare(&sql)?;
        self.count_store_call();
        let mut rows = stmt.query([])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let mut value = scalar_value(row.get_ref(0)?);
            decode_value(&mut value);
            values.push(value);
        }
        Ok(values)
    }

    /// Register the change listener, replacing any previous one.
    ///
    /// The listener runs synchronously, once per committed row-intent,
    /// immediately after that intent's cache merge completes.
    pub fn set_change_callback<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&Row) + Send + Sync + 'static,
    {
        *self.lock_callback()? = Some(Arc::new(callback));
        Ok(())
    }

    /// Remove the registered change listener, if any.
    pub fn clear_change_callback(&self) -> Result<()> {
        *self.lock_callback()? = None;
        Ok(())
    }

    /// Current store and cache counters.
    pub fn stats(&self) -> Result<TableStats> {
        Ok(TableStats {
            store_statements: self.store_statements.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cached_rows: self.lock_cache()?.len(),
        })
    }

    /// Close the underlying connection, surfacing the SQLite error if the
    /// close is refused. Dropping the handle releases the connection too.
    pub fn close(self) -> Result<()> {
        let Self { conn, .. } = self;
        match Arc::try_unwrap(conn) {
            Ok(mutex) => {
                let conn = mutex.into_inner().map_err(|_| LarderError::Database {
                    message: "Failed to acquire connection lock".to_string(),
                    source: None,
                })?;
                conn.close().map_err(|(_, err)| LarderError::Database {
                    message: format!("Failed to close database: {err}"),
                    source: Some(err),
                })
            }
            // Another owner still holds the connection; it closes when the
            // last reference drops.
            Err(_) => Ok(()),
        }
    }

    // ========================================
    // Internal plumbing
    // ========================================

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LarderError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    fn lock_cache(&self) -> Result<MutexGuard<'_, RowCache>> {
        self.cache.lock().map_err(|_| LarderError::Database {
            message: "Failed to acquire cache lock".to_string(),
            source: None,
        })
    }

    fn lock_callback(&self) -> Result<MutexGuard<'_, Option<ChangeCallback>>> {
        self.change_callback.lock().map_err(|_| LarderError::Database {
            message: "Failed to acquire callback lock".to_string(),
            source: None,
        })
    }

    fn count_store_call(&self) {
        self.store_statements.fetch_add(1, Ordering::Relaxed);
    }

    /// Merge one committed intent into the cache and produce its result row.
    fn absorb_committed(&self, intent: RowIntent) -> Result<Row> {
        let mut merged = Row::new();

        if let Some(predicate) = &intent.predicate {
            if self.options.caching {
                let mut cache = self.lock_cache()?;
                // Prior cached values become the merge base so unspecified
                // fields of a partial update survive in the returned row.
                for (column, value) in predicate {
                    if let Some(prior) = cache.take_first_match(column, value) {
                        for (key, prior_value) in prior {
                            merged.insert(key, prior_value);
                        }
                    }
                }
            }
        }

        for (key, value) in intent.columns {
            merged.insert(key, value);
        }
        decode_row(&mut merged);

        if self.options.caching {
            self.lock_cache()?.insert(merged.clone());
        }

        Ok(merged)
    }

    fn select_one(&self, column: &str, value: &Value) -> Result<Option<Row>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1",
            quote_ident(&self.options.table_name),
            quote_ident(column),
        );
        let mut stmt = conn.prepare(&sql)?;
        let column_names: Vec<String> =
            stmt.column_names().iter().map(|n| n.to_string()).collect();
        self.count_store_call();
        let mut rows = stmt.query(params![bind_value(value)])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::materialize(&column_names, row)?)),
            None => Ok(None),
        }
    }

    fn select_all(&self) -> Result<Vec<Row>> {
        let conn = self.lock_conn()?;
        let sql = format!("SELECT * FROM {}", quote_ident(&self.options.table_name));
        let mut stmt = conn.prepare(&sql)?;
        let column_names: Vec<String> =
            stmt.column_names().iter().map(|n| n.to_string()).collect();
        self.count_store_call();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(Self::materialize(&column_names, row)?);
        }
        Ok(out)
    }

    fn preload_cache(&self) -> Result<()> {
        let rows = self.select_all()?;
        let mut cache = self.lock_cache()?;
        for row in rows {
            cache.insert(row);
        }
        debug!(rows = cache.len(), "preloaded cache");
        Ok(())
    }

    /// Materialize one store row: stored scalars converted to JSON values,
    /// then textual fields decoded.
    fn materialize(column_names: &[String], row: &rusqlite::Row<'_>) -> Result<Row> {
        let mut materialized = Row::new();
        for (i, name) in column_names.iter().enumerate() {
            materialized.insert(name.clone(), scalar_value(row.get_ref(i)?));
        }
        decode_row(&mut materialized);
        Ok(materialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn row(value: Value) -> Row {
        value.as_object().cloned().expect("test row literal")
    }

    fn foods_options(dir: &TempDir) -> TableOptions {
        TableOptions::new()
            .with_table_name("foods")
            .with_dir(dir.path())
            .with_column("name", "text")
            .with_column("price", "int")
    }

    fn create_test_table() -> (TempDir, Table) {
        let temp_dir = TempDir::new().unwrap();
        let table = Table::open(foods_options(&temp_dir)).unwrap();
        (temp_dir, table)
    }

    #[test]
    fn test_open_creates_directory_and_table() {
        let temp_dir = TempDir::new().unwrap();
        let options = foods_options(&temp_dir).with_dir(temp_dir.path().join("nested"));
        let table = Table::open(options).unwrap();

        assert!(temp_dir.path().join("nested").join("sqlite.db").exists());
        assert!(table.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_open_without_schema_fails() {
        let temp_dir = TempDir::new().unwrap();
        let options = TableOptions::new()
            .with_table_name("foods")
            .with_dir(temp_dir.path());
        let err = Table::open(options).unwrap_err();
        assert!(matches!(err, LarderError::SchemaRequired { .. }));
    }

    #[test]
    fn test_existing_table_needs_no_schema() {
        let temp_dir = TempDir::new().unwrap();
        Table::open(foods_options(&temp_dir)).unwrap();

        // Reopen without columns: the table already exists.
        let options = TableOptions::new()
            .with_table_name("foods")
            .with_dir(temp_dir.path());
        assert!(Table::open(options).is_ok());
    }

    #[test]
    fn test_fetch_all_without_caching_conflicts() {
        let temp_dir = TempDir::new().unwrap();
        let options = foods_options(&temp_dir)
            .with_caching(false)
            .with_fetch_all(true);
        let err = Table::open(options).unwrap_err();
        assert!(matches!(err, LarderError::ConfigConflict { .. }));
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let (_temp, table) = create_test_table();

        let written = table.set(row(json!({"name": "apple", "price": 3}))).unwrap();
        assert_eq!(written, row(json!({"name": "apple", "price": 3})));

        let found = table.get("name", "apple").unwrap().unwrap();
        assert_eq!(found, written);
    }

    #[test]
    fn test_get_missing_is_none() {
        let (_temp, table) = create_test_table();
        assert!(table.get("name", "ghost").unwrap().is_none());
        assert!(!table.has("name", "ghost").unwrap());
    }

    #[test]
    fn test_update_merges_prior_fields() {
        let (_temp, table) = create_test_table();
        table.set(row(json!({"name": "apple", "price": 3}))).unwrap();

        let merged = table
            .set(RowIntent::update(
                row(json!({"price": 4})),
                row(json!({"name": "apple"})),
            ))
            .unwrap();

        assert_eq!(merged, row(json!({"name": "apple", "price": 4})));
        let stored = table.get_all().unwrap();
        assert_eq!(stored, vec![row(json!({"name": "apple", "price": 4}))]);
    }

    #[test]
    fn test_update_with_no_match_still_returns_columns() {
        let (_temp, table) = create_test_table();

        let merged = table
            .set(RowIntent::update(
                row(json!({"price": 4})),
                row(json!({"name": "ghost"})),
            ))
            .unwrap();

        assert_eq!(merged, row(json!({"price": 4})));
        assert!(table.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_delete_returns_affected_count() {
        let (_temp, table) = create_test_table();
        table.set(row(json!({"name": "apple", "price": 3}))).unwrap();
        table.set(row(json!({"name": "apple", "price": 9}))).unwrap();

        assert_eq!(table.delete("name", "apple").unwrap(), 2);
        assert_eq!(table.delete("name", "apple").unwrap(), 0);
        assert!(table.get("name", "apple").unwrap().is_none());
    }

    #[test]
    fn test_indexes_lists_column_values() {
        let (_temp, table) = create_test_table();
        table.set(row(json!({"name": "apple", "price": 3}))).unwrap();
        table.set(row(json!({"name": "banana", "price": 1}))).unwrap();

        let names = table.indexes("name").unwrap();
        assert_eq!(names, vec![json!("apple"), json!("banana")]);
    }

    #[test]
    fn test_uncache_disabled_returns_false() {
        let temp_dir = TempDir::new().unwrap();
        let table = Table::open(foods_options(&temp_dir).with_caching(false)).unwrap();

        assert!(!table.uncache("name", "apple").unwrap());
        assert!(!table.uncache_all().unwrap());
    }

    #[test]
    fn test_close() {
        let (_temp, table) = create_test_table();
        table.set(row(json!({"name": "apple", "price": 3}))).unwrap();
        table.close().unwrap();
    }
}
