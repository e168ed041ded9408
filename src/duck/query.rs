use std::{
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use duckdb::{
    arrow::{
        datatypes::{DataType, SchemaRef},
        record_batch::RecordBatch,
        util::pretty::pretty_format_batches,
    },
    Connection,
};
use tracing::{debug, warn};

use super::{quote_ident, table_exists, with_connection, OpenMode};
use crate::{
    config::{Config, TableName},
    error::QueryError,
};

/// One query's result: the column schema and the rows as Arrow batches.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl QueryResult {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// `(name, type)` per column, in result order.
    pub fn columns(&self) -> Vec<(String, DataType)> {
        self.schema
            .fields()
            .iter()
            .map(|f| (f.name().clone(), f.data_type().clone()))
            .collect()
    }

    /// Render as an ASCII table.
    pub fn pretty(&self) -> String {
        match pretty_format_batches(&self.batches) {
            Ok(table) => table.to_string(),
            Err(e) => format!("<unprintable result: {e}>"),
        }
    }
}

/// Execute `sql` against the database at `path` on a connection scoped to
/// this call.
///
/// A read-only open of a file that does not exist is reported as
/// [`QueryError::CatalogMissing`]: nothing has been ingested there yet.
pub fn run_query(path: &Path, mode: OpenMode, sql: &str) -> Result<QueryResult, QueryError> {
    if mode.is_read_only() && !path.exists() {
        return Err(missing_database(path));
    }
    with_connection(path, mode, |conn| execute(conn, sql))
}

fn missing_database(path: &Path) -> QueryError {
    QueryError::CatalogMissing {
        object: path.display().to_string(),
        message: format!("database file {} does not exist", path.display()),
    }
}

fn execute(conn: &Connection, sql: &str) -> Result<QueryResult, QueryError> {
    let mut stmt = conn.prepare(sql)?;
    let arrow = stmt.query_arrow([])?;
    let schema = arrow.get_schema();
    let batches: Vec<RecordBatch> = arrow.collect();
    debug!(rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(), "query done");
    Ok(QueryResult { schema, batches })
}

/// Aggregate churn figures over the labeled rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChurnSummary {
    pub customers: i64,
    /// Rows whose label encoded to 0 or 1
    pub labeled: i64,
    pub churned: i64,
    /// `churned / labeled`; `None` when nothing is labeled
    pub churn_rate: Option<f64>,
}

/// Read access to the ingested table for dashboards and the query console.
///
/// Every call opens its own read-only connection and releases it before
/// returning.
#[derive(Debug, Clone)]
pub struct QueryService {
    db_path: PathBuf,
    table: TableName,
}

impl QueryService {
    pub fn new(config: &Config) -> Self {
        Self {
            db_path: config.db_path.clone(),
            table: config.table.clone(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Hardcoded SQL with no external input.
    pub fn fixed(&self, sql: &'static str) -> Result<QueryResult, QueryError> {
        run_query(&self.db_path, OpenMode::ReadOnly, sql)
    }

    /// SQL built around the configured table; `build` receives the table
    /// name already quoted. Fails with `CatalogMissing` if the table is not
    /// in the catalog.
    pub fn table_query<F>(&self, build: F) -> Result<QueryResult, QueryError>
    where
        F: FnOnce(&str) -> String,
    {
        if !self.db_path.exists() {
            return Err(missing_database(&self.db_path));
        }
        let table = self.table.as_str();
        let sql = build(&quote_ident(table));
        with_connection(&self.db_path, OpenMode::ReadOnly, |conn| {
            if !table_exists(conn, table)? {
                return Err(QueryError::CatalogMissing {
                    object: table.to_string(),
                    message: format!("table {table} does not exist"),
                });
            }
            execute(conn, &sql)
        })
    }

    /// User-authored SQL from the ad-hoc console.
    ///
    /// Never panics and never writes: the statement runs on a
    /// [`OpenMode::Sandboxed`] connection (read-only, no external file
    /// access), engine failures come back as [`QueryError`], and a panic
    /// while converting the result is caught and returned as
    /// [`QueryError::Panicked`].
    pub fn free_text(&self, sql: &str) -> Result<QueryResult, QueryError> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(QueryError::Execution {
                message: "query must not be empty".into(),
            });
        }
        let path = self.db_path.as_path();
        panic::catch_unwind(AssertUnwindSafe(|| run_query(path, OpenMode::Sandboxed, sql)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic during query".into());
                warn!(%message, "free-text query panicked");
                Err(QueryError::Panicked { message })
            })
    }

    /// First `limit` rows of the table.
    pub fn preview(&self, limit: usize) -> Result<QueryResult, QueryError> {
        self.table_query(|t| format!("SELECT * FROM {t} LIMIT {limit}"))
    }

    pub fn row_count(&self) -> Result<i64, QueryError> {
        let res = self.table_query(|t| format!("SELECT COUNT(*) AS n FROM {t}"))?;
        Ok(first_row_i64(&res, 0).unwrap_or(0))
    }

    /// Churn rate over labeled rows only; rows with a NULL label count
    /// as customers but not toward the rate.
    pub fn churn_summary(&self) -> Result<ChurnSummary, QueryError> {
        let res = self.table_query(|t| {
            format!(
                "SELECT COUNT(*) AS customers, \
                        COUNT(churn) AS labeled, \
                        CAST(COALESCE(SUM(churn), 0) AS BIGINT) AS churned \
                 FROM {t}"
            )
        })?;
        let customers = first_row_i64(&res, 0).unwrap_or(0);
        let labeled = first_row_i64(&res, 1).unwrap_or(0);
        let churned = first_row_i64(&res, 2).unwrap_or(0);
        Ok(ChurnSummary {
            customers,
            labeled,
            churned,
            churn_rate: (labeled > 0).then(|| churned as f64 / labeled as f64),
        })
    }
}

fn first_row_i64(res: &QueryResult, col: usize) -> Option<i64> {
    use duckdb::arrow::array::{Array, Int64Array};

    let batch = res.batches.iter().find(|b| b.num_rows() > 0)?;
    let arr = batch.column(col).as_any().downcast_ref::<Int64Array>()?;
    (!arr.is_null(0)).then(|| arr.value(0))
}
