use std::{fs::File, io, path::Path};

use csv::ReaderBuilder;
use tracing::debug;

use crate::error::IngestError;

/// Cell spellings read as missing, on top of the empty field.
const NULL_TOKENS: &[&str] = &["NA", "N/A", "n/a", "NaN", "nan", "NULL", "null", "None", "<NA>"];

/// A raw scalar as typed by the reader.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Default)]
pub struct RawTable {
    /// Column names exactly as the header row spells them.
    pub headers: Vec<String>,
    /// One `Vec` per record in file order, one cell per header; `None` is missing.
    pub rows: Vec<Vec<Option<RawValue>>>,
}

impl RawTable {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Cells of column `idx`, top to bottom.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = Option<&RawValue>> + '_ {
        self.rows.iter().map(move |row| row.get(idx).and_then(Option::as_ref))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Int,
    Float,
    Text,
}

/// Read a header-first comma-delimited file into a [`RawTable`].
///
/// Each column is typed as a whole: integers if every present cell parses as
/// one, floats if every present cell parses as a number, text otherwise.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<RawTable, IngestError> {
    let path = path.as_ref();
    let malformed = |reason: String| IngestError::MalformedSource {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IngestError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => malformed(format!("cannot open: {e}")),
    })?;

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(file);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| malformed(e.to_string()))?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(malformed("missing header row".into()));
    }

    let mut cells: Vec<Vec<Option<String>>> = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| malformed(e.to_string()))?;
        cells.push(
            record
                .iter()
                .map(|c| (!is_null_token(c)).then(|| c.to_string()))
                .collect(),
        );
    }
    // `rdr` (and the file handle) is released here on every path above
    drop(rdr);

    let kinds: Vec<CellKind> = (0..headers.len())
        .map(|idx| infer_kind(cells.iter().filter_map(|row| row[idx].as_deref())))
        .collect();

    let rows = cells
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&kinds)
                .map(|(cell, kind)| cell.map(|c| typed(c, *kind)))
                .collect()
        })
        .collect::<Vec<_>>();

    debug!(rows = rows.len(), columns = headers.len(), "read raw table");
    Ok(RawTable { headers, rows })
}

fn is_null_token(cell: &str) -> bool {
    cell.is_empty() || NULL_TOKENS.contains(&cell)
}

fn infer_kind<'a>(mut present: impl Iterator<Item = &'a str> + Clone) -> CellKind {
    if present.clone().all(|c| c.trim().parse::<i64>().is_ok()) {
        CellKind::Int
    } else if present.all(|c| c.trim().parse::<f64>().is_ok()) {
        CellKind::Float
    } else {
        CellKind::Text
    }
}

fn typed(cell: String, kind: CellKind) -> RawValue {
    let parsed = match kind {
        CellKind::Int => cell.trim().parse().ok().map(RawValue::Int),
        CellKind::Float => cell.trim().parse().ok().map(RawValue::Float),
        CellKind::Text => None,
    };
    parsed.unwrap_or(RawValue::Text(cell))
}
