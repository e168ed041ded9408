use duckdb::arrow::datatypes::DataType;

use super::reader::RawValue;

/// 1) Trim, lower-case, and turn each internal whitespace char into `_`.
pub fn normalize_column_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// 2) Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

/// 3) Lenient numeric parse; anything unparseable (or NaN) is `None`.
pub fn parse_numeric(value: &RawValue) -> Option<f64> {
    let v = match value {
        RawValue::Int(i) => *i as f64,
        RawValue::Float(f) => *f,
        RawValue::Text(s) => clean_str(s).parse::<f64>().ok()?,
    };
    (!v.is_nan()).then_some(v)
}

/// 4) Arrow dtype that holds every value of a pass-through column.
pub fn infer_arrow_dtype(values: &[&RawValue]) -> DataType {
    if values.is_empty() {
        DataType::Utf8
    } else if values.iter().all(|v| matches!(v, RawValue::Int(_))) {
        DataType::Int64
    } else if values
        .iter()
        .all(|v| matches!(v, RawValue::Int(_) | RawValue::Float(_)))
    {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}
