//! SQLite access for fixtures, assertions and table backup/restore

use crate::{ContentHash, Error, Result};
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A result row keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// Database wrapper shared by the harness and the application fixtures
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Expose the underlying connection for subsystems that manage their own
    /// statements.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    /// Open an existing (or new) database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        info!("Opened database at {:?}", path.as_ref());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Execute a single statement, returning the number of changed rows
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let conn = self.conn.lock();
        let values: Vec<SqlValue> = params.iter().map(to_sql).collect();
        Ok(conn.execute(sql, params_from_iter(values.iter()))?)
    }

    /// Insert a row built from column/value pairs and return its rowid
    pub fn insert(&self, table: &str, row: &Row) -> Result<i64> {
        let table = quote_ident(table)?;
        let mut columns = Vec::with_capacity(row.len());
        for column in row.keys() {
            columns.push(quote_ident(column)?);
        }
        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
        let values: Vec<SqlValue> = row.values().map(to_sql).collect();

        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders.join(", ")
            ),
            params_from_iter(values.iter()),
        )?;

        let id = conn.last_insert_rowid();
        debug!("Inserted into {} rowid {}", table, id);
        Ok(id)
    }

    /// Run a query and collect every row
    pub fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let conn = self.conn.lock();
        let (columns, rows) = fetch(&conn, sql, params)?;

        Ok(rows
            .into_iter()
            .map(|values| {
                columns
                    .iter()
                    .cloned()
                    .zip(values.iter().map(from_sql))
                    .collect()
            })
            .collect())
    }

    /// First row of a query, if any
    pub fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query_rows(sql, params)?.into_iter().next())
    }

    /// First column of the first row, if any
    pub fn query_scalar(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        let conn = self.conn.lock();
        let (_, rows) = fetch(&conn, sql, params)?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.first().map(from_sql)))
    }

    /// Count rows in `table` whose `column` equals `value`
    pub fn count_where(&self, table: &str, column: &str, value: &Value) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            quote_ident(table)?,
            quote_ident(column)?
        );
        let count = self
            .query_scalar(&sql, std::slice::from_ref(value))?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Ok(count)
    }

    /// Column names of a table in declaration order
    pub fn columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        table_columns(&conn, table)
    }

    /// Order-independent digest of a query's result set
    pub fn digest_query(&self, sql: &str, params: &[Value]) -> Result<ContentHash> {
        let conn = self.conn.lock();
        let (columns, rows) = fetch(&conn, sql, params)?;
        Ok(digest_rows(&columns, &rows))
    }

    /// Digest of the full content of a table
    pub fn digest_table(&self, table: &str) -> Result<ContentHash> {
        let conn = self.conn.lock();
        digest_table(&conn, table)
    }

    /// Copy the full content of the given tables
    pub fn snapshot<S: AsRef<str>>(&self, tables: &[S]) -> Result<TableSnapshot> {
        let conn = self.conn.lock();
        let mut copies = Vec::with_capacity(tables.len());

        for table in tables {
            let name = table.as_ref();
            let sql = format!("SELECT * FROM {}", quote_ident(name)?);
            let (columns, rows) = fetch(&conn, &sql, &[])?;
            let digest = digest_rows(&columns, &rows);
            debug!("Snapshot of {}: {} rows, digest {}", name, rows.len(), digest);

            copies.push(TableCopy {
                name: name.to_string(),
                columns,
                rows,
                digest,
            });
        }

        Ok(TableSnapshot { tables: copies })
    }

    /// Put every table of the snapshot back to its captured content and
    /// verify the resulting digests.
    pub fn restore(&self, snapshot: &TableSnapshot) -> Result<()> {
        let mut conn = self.conn.lock();

        {
            let tx = conn.transaction()?;
            for copy in &snapshot.tables {
                let table = quote_ident(&copy.name)?;
                tx.execute(&format!("DELETE FROM {}", table), [])?;

                if copy.rows.is_empty() {
                    continue;
                }

                let mut columns = Vec::with_capacity(copy.columns.len());
                for column in &copy.columns {
                    columns.push(quote_ident(column)?);
                }
                let placeholders: Vec<String> =
                    (1..=copy.columns.len()).map(|i| format!("?{}", i)).collect();
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table,
                    columns.join(", "),
                    placeholders.join(", ")
                ))?;

                for row in &copy.rows {
                    stmt.execute(params_from_iter(row.iter()))?;
                }
            }
            tx.commit()?;
        }

        for copy in &snapshot.tables {
            let actual = digest_table(&conn, &copy.name)?;
            if actual != copy.digest {
                return Err(Error::IntegrityError(format!(
                    "table {} restored with digest {} (expected {})",
                    copy.name, actual, copy.digest
                )));
            }
        }

        info!("Restored {} table(s) from snapshot", snapshot.tables.len());
        Ok(())
    }
}

/// Full content of a set of tables captured at one point in time
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    tables: Vec<TableCopy>,
}

#[derive(Debug, Clone)]
struct TableCopy {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    digest: ContentHash,
}

impl TableSnapshot {
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Digest captured for a table
    pub fn digest(&self, table: &str) -> Option<&ContentHash> {
        self.tables.iter().find(|t| t.name == table).map(|t| &t.digest)
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.tables.iter().find(|t| t.name == table).map(|t| t.rows.len())
    }
}

/// Quote an SQL identifier, refusing anything but `[A-Za-z0-9_]`.
fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name))
}

fn fetch(conn: &Connection, sql: &str, params: &[Value]) -> Result<(Vec<String>, Vec<Vec<SqlValue>>)> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let values: Vec<SqlValue> = params.iter().map(to_sql).collect();

    let mut rows = stmt.query(params_from_iter(values.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            record.push(SqlValue::from(row.get_ref(i)?));
        }
        out.push(record);
    }

    Ok((columns, out))
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let (_, rows) = fetch(conn, &format!("PRAGMA table_info({})", quote_ident(table)?), &[])?;
    let columns: Vec<String> = rows
        .into_iter()
        .filter_map(|row| match row.get(1) {
            Some(SqlValue::Text(name)) => Some(name.clone()),
            _ => None,
        })
        .collect();

    if columns.is_empty() {
        return Err(Error::NotFound {
            kind: "table".to_string(),
            id: table.to_string(),
        });
    }
    Ok(columns)
}

fn digest_table(conn: &Connection, table: &str) -> Result<ContentHash> {
    let (columns, rows) = fetch(conn, &format!("SELECT * FROM {}", quote_ident(table)?), &[])?;
    Ok(digest_rows(&columns, &rows))
}

/// Hash column names plus the sorted canonical encoding of every row, so the
/// physical row order never changes the digest.
fn digest_rows(columns: &[String], rows: &[Vec<SqlValue>]) -> ContentHash {
    let mut encoded: Vec<Vec<u8>> = rows
        .iter()
        .map(|row| {
            let mut buf = Vec::new();
            for value in row {
                encode_value(&mut buf, value);
            }
            buf
        })
        .collect();
    encoded.sort();

    let mut hasher = Sha256::new();
    for column in columns {
        hasher.update(column.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update((rows.len() as u64).to_be_bytes());
    for row in &encoded {
        hasher.update((row.len() as u64).to_be_bytes());
        hasher.update(row);
    }

    ContentHash(hex::encode(hasher.finalize()))
}

fn encode_value(buf: &mut Vec<u8>, value: &SqlValue) {
    match value {
        SqlValue::Null => buf.push(0),
        SqlValue::Integer(i) => {
            buf.push(1);
            buf.extend_from_slice(&i.to_be_bytes());
        }
        SqlValue::Real(f) => {
            buf.push(2);
            buf.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        SqlValue::Text(s) => {
            buf.push(3);
            buf.extend_from_slice(&(s.len() as u64).to_be_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        SqlValue::Blob(b) => {
            buf.push(4);
            buf.extend_from_slice(&(b.len() as u64).to_be_bytes());
            buf.extend_from_slice(b);
        }
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(*i),
        SqlValue::Real(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s.clone()),
        SqlValue::Blob(b) => Value::String(hex::encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> Database {
        let db = Database::open_memory().unwrap();
        db.execute_batch(
            r#"
            CREATE TABLE hstgrp (
                groupid INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                flags INTEGER NOT NULL DEFAULT 0
            );
            INSERT INTO hstgrp (groupid, name) VALUES (1, 'Templates'), (2, 'Linux servers');
            "#,
        )
        .unwrap();
        db
    }

    #[test]
    fn test_query_rows_and_count() {
        let db = seeded();
        let rows = db
            .query_rows("SELECT name FROM hstgrp WHERE groupid = ?1", &[json!(2)])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("Linux servers"));

        assert_eq!(db.count_where("hstgrp", "name", &json!("Templates")).unwrap(), 1);
        assert_eq!(db.count_where("hstgrp", "name", &json!("Missing")).unwrap(), 0);
    }

    #[test]
    fn test_digest_ignores_row_order() {
        let a = seeded();
        let b = Database::open_memory().unwrap();
        b.execute_batch(
            r#"
            CREATE TABLE hstgrp (
                groupid INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                flags INTEGER NOT NULL DEFAULT 0
            );
            INSERT INTO hstgrp (groupid, name) VALUES (2, 'Linux servers');
            INSERT INTO hstgrp (groupid, name) VALUES (1, 'Templates');
            "#,
        )
        .unwrap();

        assert_eq!(a.digest_table("hstgrp").unwrap(), b.digest_table("hstgrp").unwrap());
    }

    #[test]
    fn test_digest_changes_with_content() {
        let db = seeded();
        let before = db.digest_table("hstgrp").unwrap();
        db.execute("UPDATE hstgrp SET name = ?1 WHERE groupid = 1", &[json!("Renamed")])
            .unwrap();
        assert_ne!(before, db.digest_table("hstgrp").unwrap());
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let db = seeded();
        let snapshot = db.snapshot(&["hstgrp"]).unwrap();
        let before = snapshot.digest("hstgrp").cloned().unwrap();

        let mut row = Row::new();
        row.insert("name".into(), json!("Test Group"));
        db.insert("hstgrp", &row).unwrap();
        db.execute("DELETE FROM hstgrp WHERE groupid = 1", &[]).unwrap();
        assert_ne!(db.digest_table("hstgrp").unwrap(), before);

        db.restore(&snapshot).unwrap();
        assert_eq!(db.digest_table("hstgrp").unwrap(), before);
        assert_eq!(snapshot.row_count("hstgrp"), Some(2));
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        let db = seeded();
        assert!(matches!(
            db.digest_table("hstgrp; DROP TABLE hstgrp"),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_columns_of_missing_table() {
        let db = seeded();
        assert_eq!(db.columns("hstgrp").unwrap(), vec!["groupid", "name", "flags"]);
        assert!(matches!(db.columns("nope"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let db = Database::open(&path).unwrap();
        db.execute_batch("CREATE TABLE config (configid INTEGER PRIMARY KEY, hk_audit TEXT);")
            .unwrap();
        drop(db);

        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.columns("config").unwrap(), vec!["configid", "hk_audit"]);
    }
}
