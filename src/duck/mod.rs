pub mod query;
pub mod writer;

use std::path::Path;

use duckdb::{params, AccessMode, Config, Connection};
use tracing::{trace, warn};

pub use query::{run_query, ChurnSummary, QueryResult, QueryService};
pub use writer::{write_table, WriteOutcome};

/// How a scoped connection opens the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    /// Read-only, and no file or network access beyond the database itself
    /// (`COPY ... TO`, `read_csv`, `ATTACH` are refused)
    Sandboxed,
    /// Creates the file if it doesn't exist
    ReadWrite,
}

impl OpenMode {
    pub fn is_read_only(self) -> bool {
        !matches!(self, OpenMode::ReadWrite)
    }
}

/// Open a DuckDB database on disk at `path`.
fn open(path: &Path, mode: OpenMode) -> duckdb::Result<Connection> {
    let config = match mode {
        OpenMode::ReadOnly => Config::default().access_mode(AccessMode::ReadOnly)?,
        OpenMode::Sandboxed => Config::default()
            .access_mode(AccessMode::ReadOnly)?
            .enable_external_access(false)?,
        OpenMode::ReadWrite => Config::default().access_mode(AccessMode::ReadWrite)?,
    };
    Connection::open_with_flags(path, config)
}

/// Run `f` against a connection that exists only for the duration of the call.
///
/// The connection is opened right before `f` and closed right after it,
/// whether `f` succeeds or fails; a panic in `f` drops (and so closes) it
/// during unwinding.
pub fn with_connection<T, E, F>(path: &Path, mode: OpenMode, f: F) -> Result<T, E>
where
    F: FnOnce(&mut Connection) -> Result<T, E>,
    E: From<duckdb::Error>,
{
    let mut conn = open(path, mode)?;
    trace!(path = %path.display(), ?mode, "connection opened");

    let result = f(&mut conn);

    if let Err((conn, err)) = conn.close() {
        warn!(path = %path.display(), error = %err, "close failed; dropping connection");
        drop(conn);
    }
    trace!(path = %path.display(), "connection released");
    result
}

/// Double-quote an identifier for embedding into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether `table` is in the catalog's `main` schema.
pub fn table_exists(conn: &Connection, table: &str) -> duckdb::Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM duckdb_tables() WHERE schema_name = 'main' AND table_name = ?",
        params![table],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}
