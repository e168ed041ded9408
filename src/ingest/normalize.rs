use std::{collections::BTreeMap, sync::Arc};

use duckdb::arrow::{
    array::{Array, ArrayRef, Float64Builder, Int64Builder, StringBuilder},
    datatypes::{DataType, Field, Schema, SchemaRef},
    error::ArrowError,
    record_batch::{RecordBatch, RecordBatchOptions},
};

use super::{
    reader::{RawTable, RawValue},
    utils::{clean_str, infer_arrow_dtype, normalize_column_name, parse_numeric},
};

/// Columns coerced to DOUBLE, post-rename.
pub const NUMERIC_COLUMNS: [&str; 3] = ["tenure", "monthlycharges", "totalcharges"];
/// The only column whose nulls are filled (with `0`).
pub const FILL_ZERO_COLUMN: &str = "totalcharges";
/// Target label, encoded to {0, 1}.
pub const LABEL_COLUMN: &str = "churn";

/// Raw label → encoded label. Anything else encodes to NULL.
fn encode_label(raw: &str) -> Option<i64> {
    match clean_str(raw) {
        "Yes" => Some(1),
        "No" => Some(0),
        _ => None,
    }
}

/// The normalized table plus what the normalizer had to coerce.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    pub batch: RecordBatch,
    /// Present cells in each designated numeric column that failed to parse
    pub numeric_failures: BTreeMap<String, usize>,
    /// Rows whose label was neither "Yes" nor "No" (missing included)
    pub unrecognized_labels: usize,
    /// Designated columns absent from the input
    pub missing_columns: Vec<&'static str>,
}

impl NormalizedTable {
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }
}

/// Rename columns, coerce designated numerics, zero-fill `totalcharges`
/// and encode `churn`. Pure: no I/O, same input gives the same output.
///
/// Only fails if the built columns disagree in length, which the per-column
/// builders below rule out.
pub fn normalize(raw: &RawTable) -> Result<NormalizedTable, ArrowError> {
    let mut fields = Vec::with_capacity(raw.headers.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(raw.headers.len());
    let mut numeric_failures = BTreeMap::new();
    let mut unrecognized_labels = 0;

    for (idx, header) in raw.headers.iter().enumerate() {
        let name = match normalize_column_name(header) {
            // DuckDB rejects zero-length identifiers
            n if n.is_empty() => format!("unnamed_{idx}"),
            n => n,
        };

        let (dtype, array) = if NUMERIC_COLUMNS.contains(&name.as_str()) {
            let fill = (name == FILL_ZERO_COLUMN).then_some(0.0);
            let mut failures = 0;
            let mut b = Float64Builder::with_capacity(raw.num_rows());
            for cell in raw.column(idx) {
                let v = cell.and_then(parse_numeric);
                if cell.is_some() && v.is_none() {
                    failures += 1;
                }
                b.append_option(v.or(fill));
            }
            numeric_failures.insert(name.clone(), failures);
            (DataType::Float64, Arc::new(b.finish()) as ArrayRef)
        } else if name == LABEL_COLUMN {
            let mut b = Int64Builder::with_capacity(raw.num_rows());
            for cell in raw.column(idx) {
                let v = match cell {
                    Some(RawValue::Text(s)) => encode_label(s),
                    _ => None,
                };
                if v.is_none() {
                    unrecognized_labels += 1;
                }
                b.append_option(v);
            }
            (DataType::Int64, Arc::new(b.finish()) as ArrayRef)
        } else {
            pass_through(raw, idx)
        };

        fields.push(Field::new(name, dtype, true));
        columns.push(array);
    }

    let missing_columns = NUMERIC_COLUMNS
        .iter()
        .chain(std::iter::once(&LABEL_COLUMN))
        .copied()
        .filter(|c| !fields.iter().any(|f| f.name() == c))
        .collect();

    let options = RecordBatchOptions::new().with_row_count(Some(raw.num_rows()));
    let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), columns, &options)?;

    Ok(NormalizedTable {
        batch,
        numeric_failures,
        unrecognized_labels,
        missing_columns,
    })
}

/// Keep a column's values, typed by what the reader found in it.
fn pass_through(raw: &RawTable, idx: usize) -> (DataType, ArrayRef) {
    let present: Vec<&RawValue> = raw.column(idx).flatten().collect();
    let dtype = infer_arrow_dtype(&present);

    let array: ArrayRef = match dtype {
        DataType::Int64 => {
            let mut b = Int64Builder::with_capacity(raw.num_rows());
            for cell in raw.column(idx) {
                b.append_option(match cell {
                    Some(RawValue::Int(i)) => Some(*i),
                    _ => None,
                });
            }
            Arc::new(b.finish())
        }
        DataType::Float64 => {
            let mut b = Float64Builder::with_capacity(raw.num_rows());
            for cell in raw.column(idx) {
                b.append_option(match cell {
                    Some(RawValue::Int(i)) => Some(*i as f64),
                    Some(RawValue::Float(f)) => Some(*f),
                    _ => None,
                });
            }
            Arc::new(b.finish())
        }
        _ => {
            let mut b = StringBuilder::new();
            for cell in raw.column(idx) {
                match cell {
                    Some(RawValue::Text(s)) => b.append_value(s),
                    Some(RawValue::Int(i)) => b.append_value(i.to_string()),
                    Some(RawValue::Float(f)) => b.append_value(f.to_string()),
                    None => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
    };

    (array.data_type().clone(), array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckdb::arrow::array::{Float64Array, Int64Array, StringArray};

    fn text(s: &str) -> Option<RawValue> {
        Some(RawValue::Text(s.to_string()))
    }

    fn f64s(batch: &RecordBatch, name: &str) -> Vec<Option<f64>> {
        let col = batch.column_by_name(name).unwrap();
        col.as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .iter()
            .collect()
    }

    fn i64s(batch: &RecordBatch, name: &str) -> Vec<Option<i64>> {
        let col = batch.column_by_name(name).unwrap();
        col.as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .iter()
            .collect()
    }

    fn sample() -> RawTable {
        RawTable {
            headers: vec![
                "Tenure".into(),
                " MonthlyCharges".into(),
                "TotalCharges ".into(),
                "Churn".into(),
            ],
            rows: vec![
                vec![text("12"), text("29.85"), None, text("No")],
                vec![text("x"), text("56.95"), text("1889.5"), text("Yes")],
            ],
        }
    }

    #[test]
    fn normalizes_the_two_row_scenario() -> anyhow::Result<()> {
        let out = normalize(&sample())?;
        let b = &out.batch;
        let names: Vec<_> = b.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["tenure", "monthlycharges", "totalcharges", "churn"]);

        assert_eq!(f64s(b, "tenure"), vec![Some(12.0), None]);
        assert_eq!(f64s(b, "monthlycharges"), vec![Some(29.85), Some(56.95)]);
        assert_eq!(f64s(b, "totalcharges"), vec![Some(0.0), Some(1889.5)]);
        assert_eq!(i64s(b, "churn"), vec![Some(0), Some(1)]);

        assert_eq!(out.numeric_failures["tenure"], 1);
        assert_eq!(out.numeric_failures["totalcharges"], 0);
        assert_eq!(out.unrecognized_labels, 0);
        assert!(out.missing_columns.is_empty());
        Ok(())
    }

    #[test]
    fn non_numeric_totalcharges_become_zero() -> anyhow::Result<()> {
        let raw = RawTable {
            headers: vec!["totalcharges".into()],
            rows: vec![vec![text(" ")], vec![text("abc")], vec![None], vec![text("7.5")]],
        };
        let out = normalize(&raw)?;
        assert_eq!(
            f64s(&out.batch, "totalcharges"),
            vec![Some(0.0), Some(0.0), Some(0.0), Some(7.5)]
        );
        assert_eq!(out.numeric_failures["totalcharges"], 2);
        Ok(())
    }

    #[test]
    fn other_numeric_nulls_are_not_filled() -> anyhow::Result<()> {
        let raw = RawTable {
            headers: vec!["monthlycharges".into()],
            rows: vec![vec![None], vec![Some(RawValue::Int(3))]],
        };
        let out = normalize(&raw)?;
        assert_eq!(f64s(&out.batch, "monthlycharges"), vec![None, Some(3.0)]);
        Ok(())
    }

    #[test]
    fn unrecognized_labels_encode_to_null() -> anyhow::Result<()> {
        let raw = RawTable {
            headers: vec!["churn".into()],
            rows: vec![
                vec![text("Yes")],
                vec![text("No")],
                vec![text("yes")],
                vec![text("Maybe")],
                vec![None],
                vec![Some(RawValue::Int(1))],
                vec![text(" No ")],
            ],
        };
        let out = normalize(&raw)?;
        assert_eq!(
            i64s(&out.batch, "churn"),
            vec![Some(1), Some(0), None, None, None, None, Some(0)]
        );
        assert_eq!(out.unrecognized_labels, 4);
        Ok(())
    }

    #[test]
    fn other_columns_pass_through() -> anyhow::Result<()> {
        let raw = RawTable {
            headers: vec!["Customer ID".into(), "SeniorCitizen".into(), "Score".into()],
            rows: vec![
                vec![text("7590-VHVEG"), Some(RawValue::Int(0)), Some(RawValue::Int(1))],
                vec![None, Some(RawValue::Int(1)), Some(RawValue::Float(2.5))],
            ],
        };
        let out = normalize(&raw)?;
        let b = &out.batch;
        let ids = b
            .column_by_name("customer_id")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(ids.value(0), "7590-VHVEG");
        assert!(ids.is_null(1));
        assert_eq!(i64s(b, "seniorcitizen"), vec![Some(0), Some(1)]);
        assert_eq!(f64s(b, "score"), vec![Some(1.0), Some(2.5)]);
        assert_eq!(out.missing_columns, vec!["tenure", "monthlycharges", "totalcharges", "churn"]);
        Ok(())
    }

    #[test]
    fn blank_headers_are_named_by_position() -> anyhow::Result<()> {
        let raw = RawTable {
            headers: vec!["tenure".into(), "   ".into(), "Churn".into(), "".into()],
            rows: vec![vec![text("1"), text("a"), text("No"), None]],
        };
        let out = normalize(&raw)?;
        let names: Vec<_> = out.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["tenure", "unnamed_1", "churn", "unnamed_3"]);
        Ok(())
    }

    #[test]
    fn row_count_is_preserved() -> anyhow::Result<()> {
        let raw = RawTable {
            headers: vec![],
            rows: vec![vec![], vec![], vec![]],
        };
        assert_eq!(normalize(&raw)?.num_rows(), 3);
        assert_eq!(normalize(&sample())?.num_rows(), 2);
        Ok(())
    }

    #[test]
    fn normalize_is_deterministic() -> anyhow::Result<()> {
        let a = normalize(&sample())?;
        let b = normalize(&sample())?;
        assert_eq!(a.batch, b.batch);
        Ok(())
    }
}
