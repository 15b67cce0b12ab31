//! SQLite executor for compiled statements

use std::path::Path;

use rusqlite::Connection;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Data column is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record not found")]
    NotFound,
}

pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ExecutionError> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Parse the single data column of every row. A SQL `NULL` becomes JSON `null`.
    pub fn rows(&self, sql: &str) -> Result<Vec<Value>, ExecutionError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let data: Option<String> = row.get(0)?;
            documents.push(match data {
                Some(data) => serde_json::from_str(&data)?,
                None => Value::Null,
            });
        }
        debug!(rows = documents.len(), "executed query");
        Ok(documents)
    }

    /// The first row of a single-entity read.
    pub fn single(&self, sql: &str) -> Result<Value, ExecutionError> {
        self.rows(sql)?
            .into_iter()
            .next()
            .ok_or(ExecutionError::NotFound)
    }

    pub fn count(&self, sql: &str) -> Result<i64, ExecutionError> {
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn executor() -> SqliteExecutor {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"CREATE TABLE boat_rows (id INTEGER PRIMARY KEY, Data TEXT NOT NULL);
               INSERT INTO boat_rows (Data) VALUES ('{"Name":"Ada","Length":7}');
               INSERT INTO boat_rows (Data) VALUES ('{"Name":"Bee","Length":12}');"#,
        )
        .unwrap();
        SqliteExecutor::from_connection(conn)
    }

    #[test]
    fn test_rows_are_parsed() {
        let executor = executor();
        let rows = executor
            .rows("SELECT Data FROM boat_rows ORDER BY id")
            .unwrap();
        assert_eq!(
            rows,
            vec![json!({"Name": "Ada", "Length": 7}), json!({"Name": "Bee", "Length": 12})]
        );
        assert_eq!(executor.rows("SELECT NULL").unwrap(), vec![Value::Null]);
    }

    #[test]
    fn test_single_not_found() {
        let executor = executor();
        let err = executor
            .single("SELECT Data FROM boat_rows WHERE id = 99")
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NotFound));
        assert_eq!(err.to_string(), "record not found");
    }

    #[test]
    fn test_count_and_bad_json() {
        let executor = executor();
        assert_eq!(executor.count("SELECT COUNT(*) FROM boat_rows").unwrap(), 2);
        assert!(matches!(
            executor.rows("SELECT 'not json'"),
            Err(ExecutionError::Json(_))
        ));
    }
}
