use std::path::Path;

use duckdb::{
    arrow::{
        array::{Array, Float64Array, Int64Array, StringArray},
        datatypes::{DataType, Schema},
        record_batch::RecordBatch,
    },
    types::Value,
    Connection, ToSql,
};
use tracing::{debug, info};

use super::{quote_ident, table_exists, with_connection, OpenMode};
use crate::{config::ExistingTable, error::PersistenceError, ingest::NormalizedTable};

/// What a write left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Rows in the table after the write
    pub rows: u64,
    /// Whether this call (re)built the table
    pub created: bool,
}

/// Ensure `table` exists in the database at `db_path` holding `data`.
///
/// With [`ExistingTable::Keep`] an existing table is left untouched (no
/// refresh, no duplicated rows). With [`ExistingTable::Replace`] it is
/// dropped and rebuilt. Create, or drop + create, and the row appends run in
/// one transaction, so a failed write leaves no partial table.
#[tracing::instrument(level = "info", skip(data), fields(db = %db_path.display(), rows = data.num_rows()))]
pub fn write_table(
    db_path: &Path,
    table: &str,
    data: &NormalizedTable,
    on_existing: ExistingTable,
) -> Result<WriteOutcome, PersistenceError> {
    ensure_parent(db_path)?;

    with_connection(db_path, OpenMode::ReadWrite, |conn| {
        let exists = table_exists(conn, table)?;
        let created = match (exists, on_existing) {
            (true, ExistingTable::Keep) => {
                info!(table, "table exists; keeping current rows");
                false
            }
            (_, mode) => {
                let tx = conn.transaction()?;
                if exists && mode == ExistingTable::Replace {
                    info!(table, "replacing existing table");
                    tx.execute_batch(&format!("DROP TABLE {}", quote_ident(table)))?;
                }
                tx.execute_batch(&create_table_sql(table, &data.schema()))?;
                append_batch(&tx, table, &data.batch)?;
                tx.commit()?;
                true
            }
        };

        let rows = row_count(conn, table)?;
        Ok(WriteOutcome { rows, created })
    })
}

fn ensure_parent(db_path: &Path) -> Result<(), PersistenceError> {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(PersistenceError::MissingParent {
                path: db_path.to_path_buf(),
            })
        }
        _ => Ok(()),
    }
}

fn duck_type(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Int64 => "BIGINT",
        DataType::Float64 => "DOUBLE",
        _ => "VARCHAR",
    }
}

/// DDL mirroring the normalized table's schema, column for column.
fn create_table_sql(table: &str, schema: &Schema) -> String {
    let cols: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| format!("{} {}", quote_ident(f.name()), duck_type(f.data_type())))
        .collect();
    format!("CREATE TABLE {}({});", quote_ident(table), cols.join(", "))
}

/// Cell `row` of `col` as an owned DuckDB value.
fn cell(col: &dyn Array, row: usize) -> Value {
    if col.is_null(row) {
        return Value::Null;
    }
    let any = col.as_any();
    if let Some(a) = any.downcast_ref::<Int64Array>() {
        Value::BigInt(a.value(row))
    } else if let Some(a) = any.downcast_ref::<Float64Array>() {
        Value::Double(a.value(row))
    } else if let Some(a) = any.downcast_ref::<StringArray>() {
        Value::Text(a.value(row).to_string())
    } else {
        Value::Null
    }
}

/// Append every row of `batch` via the Appender, flushing before return.
fn append_batch(conn: &Connection, table: &str, batch: &RecordBatch) -> duckdb::Result<()> {
    if batch.num_rows() == 0 {
        return Ok(());
    }
    let mut appender = conn.appender(table)?;
    let mut values: Vec<Value> = Vec::with_capacity(batch.num_columns());

    for row in 0..batch.num_rows() {
        values.clear();
        values.extend(batch.columns().iter().map(|c| cell(c.as_ref(), row)));
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
        appender.append_row(params.as_slice())?;
    }
    appender.flush()?;
    debug!(table, rows = batch.num_rows(), "appended rows");
    Ok(())
}

pub fn row_count(conn: &Connection, table: &str) -> duckdb::Result<u64> {
    let n: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |r| r.get(0),
    )?;
    Ok(n.max(0) as u64)
}
