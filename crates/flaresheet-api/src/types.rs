use std::cmp::Ordering;
use std::fmt;

use chrono::{
    DateTime,
    Datelike,
    Duration,
    NaiveDate,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::error::SchemaError;

/// Inclusive range of UTC calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TimeRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if start > end {
            return Err(format!("start date {start} is after end date {end}"));
        }
        Ok(Self { start, end })
    }

    /// The full calendar month before the one containing `now`
    pub fn previous_month(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let first_of_this_month = today.with_day(1).unwrap_or(today);
        let end = first_of_this_month - Duration::days(1);
        let start = end.with_day(1).unwrap_or(end);
        Self { start, end }
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Splits into consecutive chunks of at most `max_days`, oldest first
    pub fn split(&self, max_days: u32) -> Vec<TimeRange> {
        let max_days = i64::from(max_days.max(1));
        let mut chunks = Vec::new();
        let mut cursor = self.start;

        while cursor <= self.end {
            let chunk_end = (cursor + Duration::days(max_days - 1)).min(self.end);
            chunks.push(TimeRange {
                start: cursor,
                end: chunk_end,
            });
            cursor = chunk_end + Duration::days(1);
        }

        chunks
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// One raw unit returned by a metrics provider
///
/// Dimensions identify the record (date, host, ...); measures hold the
/// counters and may be nested the way the provider groups them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    dimensions: serde_json::Map<String, serde_json::Value>,
    measures: serde_json::Map<String, serde_json::Value>,
}

impl MetricRecord {
    pub fn new(
        dimensions: serde_json::Map<String, serde_json::Value>,
        measures: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            dimensions,
            measures,
        }
    }

    pub fn dimensions(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.dimensions
    }

    pub fn measures(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.measures
    }

    pub fn dimension(&self, key: &str) -> Option<&serde_json::Value> {
        self.dimensions.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Date,
    Text,
    Integer,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Dimension,
    Measure,
}

/// What a column holds when the provider omitted its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingValue {
    /// The record is malformed without it
    Required,
    /// Counter semantics: absent means nothing was counted
    Zero,
    /// Unknown, written as an empty cell
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    /// Flattened key of a dimension, e.g. `date` or `host`
    Dimension(&'static str),
    /// Flattened dotted path of a measure, e.g. `sum.requests`
    Measure(&'static str),
    /// `numerator / denominator * 100` over two earlier columns, rounded to
    /// two decimals; zero when the denominator is zero
    Percentage {
        numerator: &'static str,
        denominator: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    /// Header text written to the destination
    pub label: &'static str,
    pub column_type: ColumnType,
    pub role: ColumnRole,
    pub source: ColumnSource,
    pub missing: MissingValue,
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
}

impl TableSchema {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.label).collect()
    }

    pub fn dimension_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.role == ColumnRole::Dimension)
            .map(|(i, _)| i)
            .collect()
    }

    /// Index of the first date-typed dimension, used as the primary sort key
    pub fn date_index(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.role == ColumnRole::Dimension && c.column_type == ColumnType::Date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Date(NaiveDate),
    Text(String),
    Integer(i64),
    Float(f64),
    Null,
}

impl CellValue {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn matches(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (Self::Null, _)
                | (Self::Date(_), ColumnType::Date)
                | (Self::Text(_), ColumnType::Text)
                | (Self::Integer(_), ColumnType::Integer)
                | (Self::Float(_), ColumnType::Float)
        )
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Text(s) => write!(f, "{s}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Null => Ok(()),
        }
    }
}

pub type Row = Vec<CellValue>;

/// Rows sharing one schema, sorted by (date, first other dimension)
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTable {
    schema: &'static TableSchema,
    rows: Vec<Row>,
}

impl MetricTable {
    pub fn empty(schema: &'static TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Checks every row against the schema and sorts them
    pub fn from_rows(schema: &'static TableSchema, mut rows: Vec<Row>) -> Result<Self, SchemaError> {
        for (index, row) in rows.iter().enumerate() {
            if row.len() != schema.columns.len() {
                return Err(SchemaError::RowMismatch {
                    row: index,
                    schema: schema.name.to_string(),
                    reason: format!(
                        "expected {} columns, found {}",
                        schema.columns.len(),
                        row.len()
                    ),
                });
            }
            for (cell, column) in row.iter().zip(schema.columns) {
                if !cell.matches(column.column_type) {
                    return Err(SchemaError::RowMismatch {
                        row: index,
                        schema: schema.name.to_string(),
                        reason: format!("column '{}' holds {cell:?}", column.name),
                    });
                }
                if *cell == CellValue::Null && column.missing != MissingValue::Null {
                    return Err(SchemaError::RowMismatch {
                        row: index,
                        schema: schema.name.to_string(),
                        reason: format!("column '{}' does not allow empty values", column.name),
                    });
                }
            }
        }

        rows.sort_by(|a, b| compare_rows(schema, a, b));
        Ok(Self { schema, rows })
    }

    pub fn schema(&self) -> &'static TableSchema {
        self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Identity of a row for upserts: its dimension values joined by `|`
    pub fn row_key(&self, row: &Row) -> String {
        row_key(self.schema, row)
    }

    pub fn column(&self, name: &str) -> Option<Vec<&CellValue>> {
        let index = self.schema.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[index]).collect())
    }
}

pub fn row_key(schema: &TableSchema, row: &Row) -> String {
    schema
        .dimension_indices()
        .into_iter()
        .filter_map(|i| row.get(i))
        .map(|cell| cell.to_string())
        .collect::<Vec<_>>()
        .join("|")
}

fn compare_rows(schema: &TableSchema, a: &Row, b: &Row) -> Ordering {
    let date_index = schema.date_index();
    if let Some(i) = date_index {
        let ordering = a[i].as_date().cmp(&b[i].as_date());
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    for i in schema.dimension_indices() {
        if Some(i) == date_index {
            continue;
        }
        let ordering = a[i].to_string().cmp(&b[i].to_string());
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}
