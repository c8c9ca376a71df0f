//! Record store — an in-memory SQLite database seeded from definition files.
//!
//! Schema files (`<schema_dir>/*.sql`) declare tables; data files
//! (`<data_dir>/*.sql`) hold row statements mixed with human comments.
//! `save_all` writes each table back to `<data_dir>/<table>_data.sql`
//! without disturbing anything that is not one of its row statements.

pub mod export;
pub mod statement;

use chrono::Local;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Params};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::config::StoreConfig;
use export::{merge_data_file, TableShape, UnrecognizedRow};

/// Column stamped with the current time on every upsert, when declared.
pub const MODIFIED_TS: &str = "modified_ts";

/// Timestamp format used for `modified_ts` and other generated stamps.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Named, nullable field values for one row.
pub type RowFields = BTreeMap<String, Option<String>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to load {}: {source}", path.display())]
    SchemaLoad {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("table {0} was not declared by any schema file")]
    UnknownTable(String),
    #[error("table {table} has no column {column}")]
    UnknownColumn { table: String, column: String },
    #[error("row for {table} has no value for primary key {column}")]
    MissingPrimaryKey { table: String, column: String },
    #[error(transparent)]
    UnrecognizedRow(#[from] UnrecognizedRow),
    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A declared table: columns in declaration order and the key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub primary_key: usize,
}

impl TableInfo {
    pub fn primary_key_column(&self) -> &str {
        &self.columns[self.primary_key]
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    fn shape(&self) -> TableShape<'_> {
        TableShape {
            name: &self.name,
            columns: &self.columns,
            primary_key: self.primary_key,
        }
    }
}

/// Single-owner in-memory store. Not shared across threads; callers that
/// need concurrency keep one store per worker or serialize access.
#[derive(Debug)]
pub struct RecordStore {
    conn: Connection,
    data_dir: PathBuf,
    tables: Vec<TableInfo>,
}

impl RecordStore {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::load(&config.schema_dir, &config.data_dir)
    }

    /// Execute every schema file, then every data file, each directory in
    /// file-name order. Any failure discards the whole database.
    pub fn load(schema_dir: &Path, data_dir: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;

        for path in sql_files(schema_dir)? {
            run_script(&conn, &path)?;
        }
        let tables = declared_tables(&conn)?;

        if data_dir.is_dir() {
            for path in sql_files(data_dir)? {
                run_script(&conn, &path)?;
            }
        }

        tracing::debug!(
            tables = tables.len(),
            schema_dir = %schema_dir.display(),
            data_dir = %data_dir.display(),
            "record store loaded"
        );

        Ok(Self {
            conn,
            data_dir: data_dir.to_path_buf(),
            tables,
        })
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Result<&TableInfo, StoreError> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }

    /// `<data_dir>/<table>_data.sql`
    pub fn data_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{table}_data.sql"))
    }

    /// Insert a row, or replace the row that shares its primary key.
    ///
    /// Replacement is whole-row: columns not named in `fields` end up NULL
    /// (or their declared default). `modified_ts` is stamped when the table
    /// declares it, overriding any supplied value.
    pub fn upsert(&mut self, table: &str, fields: &RowFields) -> Result<(), StoreError> {
        let info = self.table(table)?;

        let mut assigned: BTreeMap<usize, Option<String>> = BTreeMap::new();
        for (column, value) in fields {
            let idx = info
                .column_index(column)
                .ok_or_else(|| StoreError::UnknownColumn {
                    table: info.name.clone(),
                    column: column.clone(),
                })?;
            assigned.insert(idx, value.clone());
        }

        if !matches!(assigned.get(&info.primary_key), Some(Some(_))) {
            return Err(StoreError::MissingPrimaryKey {
                table: info.name.clone(),
                column: info.primary_key_column().to_string(),
            });
        }

        if let Some(idx) = info.column_index(MODIFIED_TS) {
            assigned.insert(idx, Some(current_ts()));
        }

        let columns: Vec<String> = assigned
            .keys()
            .map(|&idx| quote_ident(&info.columns[idx]))
            .collect();
        let placeholders: Vec<String> = (1..=assigned.len()).map(|n| format!("?{n}")).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            quote_ident(&info.name),
            columns.join(", "),
            placeholders.join(", ")
        );

        self.conn.execute(&sql, params_from_iter(assigned.values()))?;
        Ok(())
    }

    /// Run any statement against the underlying engine and return its rows
    /// as-is.
    pub fn query<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Vec<Value>>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let width = stmt.column_count();
        let rows = stmt.query_map(params, |row| {
            (0..width).map(|i| row.get::<_, Value>(i)).collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn rows(&self, info: &TableInfo) -> Result<Vec<Vec<Value>>, StoreError> {
        let sql = format!("SELECT * FROM {}", quote_ident(&info.name));
        self.query(&sql, [])
    }

    /// Write one table back to its data file.
    pub fn save_table(&self, table: &str) -> Result<PathBuf, StoreError> {
        let info = self.table(table)?;
        let path = self.data_path(&info.name);
        std::fs::create_dir_all(&self.data_dir)?;

        let existing = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let rows = self.rows(info)?;
        let merged = merge_data_file(&info.shape(), &rows, &existing)?;

        if merged == existing && path.exists() {
            return Ok(path);
        }
        write_atomically(&path, merged.as_bytes())?;
        tracing::debug!(table = %info.name, rows = rows.len(), path = %path.display(), "saved table");
        Ok(path)
    }

    /// Re-materialize every declared table's data file.
    pub fn save_all(&self) -> Result<(), StoreError> {
        for info in &self.tables {
            self.save_table(&info.name)?;
        }
        Ok(())
    }

    /// Release the database. The store cannot be used afterwards.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::Sql(e))
    }
}

/// Local time in `TS_FORMAT`.
pub fn current_ts() -> String {
    Local::now().format(TS_FORMAT).to_string()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `.sql` files directly inside `dir`, sorted by file name.
fn sql_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("sql") {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn run_script(conn: &Connection, path: &Path) -> Result<(), StoreError> {
    let sql = std::fs::read_to_string(path)?;
    conn.execute_batch(&sql).map_err(|source| StoreError::SchemaLoad {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "executed definition file");
    Ok(())
}

fn declared_tables(conn: &Connection) -> Result<Vec<TableInfo>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let mut info = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(&name)))?;
        // (column name, position within the primary key; 0 if not part of it)
        let cols = info
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(5)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let primary_key = cols.iter().position(|(_, pk)| *pk == 1).unwrap_or(0);
        tables.push(TableInfo {
            name,
            columns: cols.into_iter().map(|(c, _)| c).collect(),
            primary_key,
        });
    }
    Ok(tables)
}

/// Replace `path` with `bytes` so that it is either fully old or fully new.
///
/// The temporary file lives next to `path`, so the final rename never
/// crosses a filesystem.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
