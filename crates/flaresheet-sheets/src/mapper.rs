//! Conversion between metric tables and sheet cells, and the upsert merge

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{
    Datelike,
    Duration,
    NaiveDate,
};
use flaresheet_api::{
    CellValue,
    ColumnSpec,
    ColumnType,
    MetricTable,
    Row,
    TableSchema,
    TimeRange,
};
use regex::Regex;
use serde_json::Value;

use crate::config::{
    BytesFormat,
    UploaderSettings,
};

static DATE_FORMULA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^=\s*DATE\(\s*(\d{4})\s*,\s*(\d{1,2})\s*,\s*(\d{1,2})\s*\)$")
        .expect("Invalid regex pattern")
});

const BYTE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Spreadsheet column letters for a zero-based index: 0 is `A`, 26 is `AA`
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Quotes a tab title for use in A1 notation
pub fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// `'Tab'!A{row}` anchor for a write starting at column A
pub fn anchor_range(sheet: &str, row: usize) -> String {
    format!("{}!A{row}", quote_sheet_name(sheet))
}

/// Whole-row range covering rows `first..=last` (1-based)
pub fn rows_range(sheet: &str, first: usize, last: usize) -> String {
    format!("{}!{first}:{last}", quote_sheet_name(sheet))
}

pub fn format_bytes(bytes: i64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size.abs() >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", BYTE_UNITS[unit])
}

fn is_bytes_column(column: &ColumnSpec) -> bool {
    column.column_type == ColumnType::Integer
        && (column.name == "bytes" || column.name.ends_with("_bytes"))
}

pub fn date_formula(date: NaiveDate) -> String {
    format!("=DATE({}, {}, {})", date.year(), date.month(), date.day())
}

/// Cell payload for `values.update` with `USER_ENTERED` input
pub fn cell_to_value(cell: &CellValue, column: &ColumnSpec, settings: &UploaderSettings) -> Value {
    match cell {
        CellValue::Date(date) if settings.format_dates => Value::String(date_formula(*date)),
        CellValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
        CellValue::Integer(v)
            if settings.bytes_format == BytesFormat::Human && is_bytes_column(column) =>
        {
            Value::String(format_bytes(*v))
        }
        CellValue::Integer(v) => Value::from(*v),
        CellValue::Float(v) => serde_json::Number::from_f64(*v)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(String::new())),
        CellValue::Text(s) => Value::String(s.clone()),
        CellValue::Null => Value::String(String::new()),
    }
}

pub fn row_to_values(row: &Row, schema: &TableSchema, settings: &UploaderSettings) -> Vec<Value> {
    row.iter()
        .zip(schema.columns)
        .map(|(cell, column)| cell_to_value(cell, column, settings))
        .collect()
}

pub fn header_values(schema: &TableSchema) -> Vec<Value> {
    schema
        .labels()
        .into_iter()
        .map(|label| Value::String(label.to_string()))
        .collect()
}

/// Reads a date back from a cell as the sheet renders it with `FORMULA`
///
/// Accepts `=DATE(y, m, d)` formulas, ISO `YYYY-MM-DD` text, and serial
/// numbers counted from 1899-12-30.
pub fn parse_sheet_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Some(caps) = DATE_FORMULA.captures(s) {
                let year = caps[1].parse().ok()?;
                let month = caps[2].parse().ok()?;
                let day = caps[3].parse().ok()?;
                return NaiveDate::from_ymd_opt(year, month, day);
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
        }
        Value::Number(n) => {
            let serial = n.as_f64()?;
            if !(1.0..=2_958_465.0).contains(&serial) {
                return None;
            }
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            epoch.checked_add_signed(Duration::days(serial.floor() as i64))
        }
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_blank(row: &[Value]) -> bool {
    row.iter().all(|v| value_text(v).trim().is_empty())
}

/// Sort position and identity of an existing sheet row, if it is a data row
///
/// Keys are built the same way as [`flaresheet_api::row_key`] so existing
/// rows can be matched against incoming ones.
fn existing_key(schema: &TableSchema, row: &[Value]) -> Option<(Option<NaiveDate>, String)> {
    let date_index = schema.date_index();
    let date = match date_index {
        Some(i) => Some(parse_sheet_date(row.get(i)?)?),
        None => None,
    };

    let parts: Vec<String> = schema
        .dimension_indices()
        .into_iter()
        .map(|i| match (Some(i) == date_index, date) {
            (true, Some(d)) => d.format("%Y-%m-%d").to_string(),
            _ => row.get(i).map(value_text).unwrap_or_default(),
        })
        .collect();

    if date.is_none() && parts.iter().all(|p| p.is_empty()) {
        return None;
    }
    Some((date, parts.join("|")))
}

/// Result of merging an incoming table into the current tab contents
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    /// Full tab contents from A1, header included, padded to equal width
    pub values: Vec<Vec<Value>>,
    /// Existing data rows kept because they lie outside the period
    pub kept: usize,
    /// Existing data rows removed because the period or a key covered them
    pub replaced: usize,
    /// Rows that are not data rows, kept after the data
    pub preserved: usize,
    /// 1-based inclusive rows left over from a longer previous state
    pub stale_rows: Option<(usize, usize)>,
}

/// Period-scoped upsert of `table` over the `existing` tab contents
pub fn plan_merge(
    table: &MetricTable, range: &TimeRange, existing: &[Vec<Value>], settings: &UploaderSettings,
) -> MergePlan {
    let schema = table.schema();

    let incoming_keys: HashSet<String> = table.rows().iter().map(|r| table.row_key(r)).collect();

    let mut body = existing;
    if let Some(first) = existing.first() {
        if existing_key(schema, first).is_none() {
            body = &existing[1..];
        }
    }

    let mut data: Vec<(Option<NaiveDate>, String, Vec<Value>)> = Vec::new();
    let mut trailer = Vec::new();
    let mut replaced = 0;

    for row in body {
        if is_blank(row) {
            continue;
        }
        match existing_key(schema, row) {
            Some((date, key)) => {
                let in_period = date.is_some_and(|d| range.contains(d));
                if in_period || incoming_keys.contains(&key) {
                    replaced += 1;
                } else {
                    data.push((date, key, row.clone()));
                }
            }
            None => trailer.push(row.clone()),
        }
    }
    let kept = data.len();
    let preserved = trailer.len();

    let date_index = schema.date_index();
    for row in table.rows() {
        let date = date_index.and_then(|i| row[i].as_date());
        data.push((date, table.row_key(row), row_to_values(row, schema, settings)));
    }
    data.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

    let mut values = Vec::with_capacity(1 + data.len() + trailer.len());
    values.push(header_values(schema));
    values.extend(data.into_iter().map(|(_, _, row)| row));
    values.extend(trailer);

    let width = values
        .iter()
        .chain(existing)
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    for row in &mut values {
        row.resize(width, Value::String(String::new()));
    }

    let stale_rows = (existing.len() > values.len()).then(|| (values.len() + 1, existing.len()));

    MergePlan {
        values,
        kept,
        replaced,
        preserved,
        stale_rows,
    }
}
