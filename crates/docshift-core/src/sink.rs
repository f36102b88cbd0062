//! Relational sinks: where migrated rows land.
//!
//! The engine writes through a narrow trait so the orchestrator and link
//! emitter never touch SQL directly; the concrete sink is SQLite.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{MigrateError, Result};

/// One SQL parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value, ValueRef};
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
        })
    }
}

/// A row as ordered (column, value) pairs.
pub type SqlRow = Vec<(String, SqlValue)>;

/// Write interface the migration engine runs against.
pub trait RelationalSink {
    fn insert(&mut self, table: &str, row: &SqlRow) -> Result<()>;

    /// Insert a homogeneous batch (all rows share the first row's columns).
    fn insert_many(&mut self, table: &str, rows: &[SqlRow]) -> Result<()>;

    /// Update columns of the row with the given surrogate id.
    fn update_by_id(&mut self, table: &str, assignments: &SqlRow, id: i64) -> Result<()>;

    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Drop a stale identifier-map audit table, if any.
    fn reset_id_map(&mut self, table: &str) -> Result<()>;

    /// Create the identifier-map audit table (three columns, no
    /// uniqueness constraint).
    fn create_id_map(&mut self, table: &str) -> Result<()>;
}

/// SQLite sink.
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Open (or create) the target database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| MigrateError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )?;
        Ok(Self { conn })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn insert_sql(table: &str, row: &SqlRow) -> String {
    let columns = row
        .iter()
        .map(|(c, _)| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=row.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders})",
        quote_ident(table)
    )
}

impl RelationalSink for SqliteSink {
    fn insert(&mut self, table: &str, row: &SqlRow) -> Result<()> {
        self.conn
            .execute(
                &insert_sql(table, row),
                rusqlite::params_from_iter(row.iter().map(|(_, v)| v)),
            )
            .map_err(|e| MigrateError::from_sqlite(table, e))?;
        Ok(())
    }

    fn insert_many(&mut self, table: &str, rows: &[SqlRow]) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let mut stmt = self
            .conn
            .prepare(&insert_sql(table, first))
            .map_err(|e| MigrateError::from_sqlite(table, e))?;
        for row in rows {
            stmt.execute(rusqlite::params_from_iter(row.iter().map(|(_, v)| v)))
                .map_err(|e| MigrateError::from_sqlite(table, e))?;
        }
        debug!(table, rows = rows.len(), "inserted batch");
        Ok(())
    }

    fn update_by_id(&mut self, table: &str, assignments: &SqlRow, id: i64) -> Result<()> {
        let set = assignments
            .iter()
            .enumerate()
            .map(|(i, (c, _))| format!("{} = ?{}", quote_ident(c), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {set} WHERE id = ?{}",
            quote_ident(table),
            assignments.len() + 1
        );

        let mut params: Vec<&dyn rusqlite::ToSql> =
            assignments.iter().map(|(_, v)| v as &dyn rusqlite::ToSql).collect();
        let id = SqlValue::Integer(id);
        params.push(&id);

        self.conn
            .execute(&sql, params.as_slice())
            .map_err(|e| MigrateError::from_sqlite(table, e))?;
        Ok(())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn reset_id_map(&mut self, table: &str) -> Result<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))?;
        Ok(())
    }

    fn create_id_map(&mut self, table: &str) -> Result<()> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                source_id TEXT,
                collection TEXT,
                sql_id INTEGER
            )",
            quote_ident(table)
        ))?;
        Ok(())
    }
}
