use crate::constants::sql;
use crate::error::{JotaError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// What running a query produced: rows or an error, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlOutcome {
    Rows {
        column_names: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlResult {
    pub query: String,
    pub outcome: SqlOutcome,
}

impl SqlResult {
    pub fn rows(query: impl Into<String>, column_names: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            query: query.into(),
            outcome: SqlOutcome::Rows { column_names, rows },
        }
    }

    pub fn error(query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            outcome: SqlOutcome::Error(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, SqlOutcome::Error(_))
    }

    pub fn error_text(&self) -> Option<&str> {
        match self.outcome {
            SqlOutcome::Error(ref e) => Some(e.as_str()),
            SqlOutcome::Rows { .. } => None,
        }
    }

    pub fn column_names(&self) -> Option<&[String]> {
        match self.outcome {
            SqlOutcome::Rows { ref column_names, .. } => Some(column_names.as_slice()),
            SqlOutcome::Error(_) => None,
        }
    }

    pub fn result_rows(&self) -> Option<&[Vec<String>]> {
        match self.outcome {
            SqlOutcome::Rows { ref rows, .. } => Some(rows.as_slice()),
            SqlOutcome::Error(_) => None,
        }
    }

    /// Rows returned, zero for errors.
    pub fn row_count(&self) -> usize {
        self.result_rows().map_or(0, |rows| rows.len())
    }
}

/// A database the hint pipeline can query.
///
/// `execute` never fails: database errors come back inside the [`SqlResult`].
#[async_trait::async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Dialect name used in prompts, e.g. `sqlite`.
    fn engine(&self) -> &str;

    /// Schema description handed to the model verbatim.
    fn schema(&self) -> &str;

    async fn execute(&self, query: &str) -> SqlResult;
}

/// SQLite-backed executor. Queries run on the blocking thread pool.
pub struct SqliteExecutor {
    connection: Arc<Mutex<Connection>>,
    schema: String,
}

impl SqliteExecutor {
    pub fn new(connection: Connection, schema: impl Into<String>) -> Self {
        Self {
            connection: Arc::new(Mutex::new(connection)),
            schema: schema.into(),
        }
    }

    /// Open an existing database file without write access.
    pub fn open_read_only(path: impl AsRef<Path>, schema: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::info!("Opened {} read-only", path.display());
        Ok(Self::new(connection, schema))
    }

    pub fn open_in_memory(schema: impl Into<String>) -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?, schema))
    }

    /// Run setup statements (fixtures, migrations) directly on the connection.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let connection = self
            .connection
            .lock()
            .map_err(|_| JotaError::Other("SQLite connection lock poisoned".into()))?;
        connection.execute_batch(sql)?;
        Ok(())
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

fn run_query(connection: &Connection, query: &str) -> rusqlite::Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut stmt = connection.prepare(query)?;
    let column_names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let column_count = stmt.column_count();

    let mut rows = stmt.query(rusqlite::params![])?;
    let mut rendered = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(column_count);
        for i in 0..column_count {
            cells.push(render_value(row.get_ref(i)?));
        }
        rendered.push(cells);
    }
    Ok((column_names, rendered))
}

#[async_trait::async_trait]
impl SqlExecutor for SqliteExecutor {
    fn engine(&self) -> &str {
        sql::ENGINE_SQLITE
    }

    fn schema(&self) -> &str {
        &self.schema
    }

    async fn execute(&self, query: &str) -> SqlResult {
        let connection = self.connection.clone();
        let owned = query.to_string();
        let outcome = tokio::task::spawn_blocking(move || {
            let connection = connection
                .lock()
                .map_err(|_| "SQLite connection lock poisoned".to_string())?;
            run_query(&connection, &owned).map_err(|e| e.to_string())
        })
        .await;

        match outcome {
            Ok(Ok((column_names, rows))) => {
                tracing::debug!("Query returned {} rows: {}", rows.len(), query);
                SqlResult::rows(query, column_names, rows)
            }
            Ok(Err(error)) => {
                tracing::debug!("Query failed ({}): {}", error, query);
                SqlResult::error(query, error)
            }
            Err(e) => SqlResult::error(query, format!("Query task failed: {e}")),
        }
    }
}
