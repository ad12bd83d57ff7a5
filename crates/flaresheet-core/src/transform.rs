//! Raw provider records to a typed, sorted table

use std::collections::BTreeMap;

use chrono::{
    DateTime,
    NaiveDate,
};
use flaresheet_api::{
    CellValue,
    ColumnSource,
    ColumnSpec,
    ColumnType,
    MetricRecord,
    MetricTable,
    MissingValue,
    Row,
    SchemaError,
    SchemaResult,
    TableSchema,
};
use serde_json::{
    Map,
    Value,
};

/// Normalises records into the column layout of one schema
#[derive(Debug, Clone, Copy)]
pub struct Transformer {
    schema: &'static TableSchema,
}

impl Transformer {
    pub fn new(schema: &'static TableSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &'static TableSchema {
        self.schema
    }

    /// Fails on the first malformed record, naming its index
    pub fn transform(&self, records: &[MetricRecord]) -> SchemaResult<MetricTable> {
        let rows = records
            .iter()
            .enumerate()
            .map(|(index, record)| self.record_to_row(index, record))
            .collect::<SchemaResult<Vec<Row>>>()?;

        MetricTable::from_rows(self.schema, rows)
    }

    fn record_to_row(&self, index: usize, record: &MetricRecord) -> SchemaResult<Row> {
        let dimensions = flatten(record.dimensions());
        let measures = flatten(record.measures());

        let mut row: Row = Vec::with_capacity(self.schema.columns.len());
        for column in self.schema.columns {
            let cell = match column.source {
                ColumnSource::Dimension(key) => match present(dimensions.get(key)) {
                    Some(value) => coerce(index, column, value)?,
                    None if column.missing == MissingValue::Required => {
                        return Err(SchemaError::MissingDimension {
                            record: index,
                            key: key.to_string(),
                        });
                    }
                    None => missing_value(column),
                },
                ColumnSource::Measure(path) => match present(measures.get(path)) {
                    Some(value) => coerce(index, column, value)?,
                    None if column.missing == MissingValue::Required => {
                        return Err(SchemaError::InvalidValue {
                            record: index,
                            column: column.name.to_string(),
                            value: "missing".to_string(),
                        });
                    }
                    None => missing_value(column),
                },
                ColumnSource::Percentage {
                    numerator,
                    denominator,
                } => {
                    let part = self.earlier(&row, numerator);
                    let whole = self.earlier(&row, denominator);
                    CellValue::Float(percentage(part, whole))
                }
            };
            row.push(cell);
        }
        Ok(row)
    }

    fn earlier(&self, row: &Row, column: &str) -> f64 {
        self.schema
            .column_index(column)
            .and_then(|i| row.get(i))
            .and_then(CellValue::as_f64)
            .unwrap_or(0.0)
    }
}

/// Flattens nested objects into dotted paths: `{"sum": {"bytes": 1}}`
/// becomes `{"sum.bytes": 1}`
pub fn flatten(map: &Map<String, Value>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into("", map, &mut out);
    out
}

fn flatten_into(prefix: &str, map: &Map<String, Value>, out: &mut BTreeMap<String, Value>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => flatten_into(&path, inner, out),
            other => {
                out.insert(path, other.clone());
            }
        }
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn missing_value(column: &ColumnSpec) -> CellValue {
    match (column.missing, column.column_type) {
        (MissingValue::Zero, ColumnType::Integer) => CellValue::Integer(0),
        (MissingValue::Zero, ColumnType::Float) => CellValue::Float(0.0),
        (MissingValue::Zero, ColumnType::Text) => CellValue::Text(String::new()),
        _ => CellValue::Null,
    }
}

/// `part / whole * 100`, rounded to two decimals; zero when `whole` is zero
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    (part / whole * 100.0 * 100.0).round() / 100.0
}

fn coerce(record: usize, column: &ColumnSpec, value: &Value) -> SchemaResult<CellValue> {
    let invalid = || SchemaError::InvalidValue {
        record,
        column: column.name.to_string(),
        value: value.to_string(),
    };

    let cell = match column.column_type {
        ColumnType::Date => value.as_str().and_then(parse_date).map(CellValue::Date),
        ColumnType::Text => match value {
            Value::String(s) => Some(CellValue::Text(s.clone())),
            Value::Number(n) => Some(CellValue::Text(n.to_string())),
            Value::Bool(b) => Some(CellValue::Text(b.to_string())),
            _ => None,
        },
        ColumnType::Integer => as_integer(value).map(CellValue::Integer),
        ColumnType::Float => as_float(value).map(CellValue::Float),
    };
    cell.ok_or_else(invalid)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use flaresheet_cloudflare::DAILY_TRAFFIC;
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> MetricRecord {
        let dimensions = value["dimensions"].as_object().cloned().unwrap_or_default();
        let mut measures = Map::new();
        for key in ["sum", "uniq"] {
            if let Some(inner) = value.get(key) {
                measures.insert(key.to_string(), inner.clone());
            }
        }
        MetricRecord::new(dimensions, measures)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn transformer() -> Transformer {
        Transformer::new(&DAILY_TRAFFIC)
    }

    #[test]
    fn test_rows_are_sorted_with_full_schema() {
        let records = vec![
            record(json!({
                "dimensions": {"date": "2024-03-02"},
                "sum": {"requests": 200, "cachedRequests": 50, "bytes": 2048,
                        "cachedBytes": 1024, "pageViews": 20, "threats": 1},
                "uniq": {"uniques": 12}
            })),
            record(json!({
                "dimensions": {"date": "2024-03-01"},
                "sum": {"requests": 100, "cachedRequests": 25},
                "uniq": {"uniques": 10}
            })),
            record(json!({
                "dimensions": {"date": "2024-03-03"},
                "sum": {"requests": 300},
            })),
        ];

        let table = transformer().transform(&records).unwrap();
        assert_eq!(table.len(), 3);

        let dates: Vec<_> = table.rows().iter().map(|r| r[0].as_date()).collect();
        assert_eq!(dates, vec![Some(day(1)), Some(day(2)), Some(day(3))]);
        for row in table.rows() {
            assert_eq!(row.len(), DAILY_TRAFFIC.columns.len());
        }

        let requests = table.column("requests").unwrap();
        assert_eq!(requests[1], &CellValue::Integer(200));
        let bytes = table.column("bytes").unwrap();
        assert_eq!(bytes[0], &CellValue::Integer(0));
        let uniques = table.column("uniques").unwrap();
        assert_eq!(uniques[2], &CellValue::Integer(0));
    }

    #[test]
    fn test_cache_ratio() {
        let records = vec![
            record(json!({
                "dimensions": {"date": "2024-03-01"},
                "sum": {"requests": 3, "cachedRequests": 1}
            })),
            record(json!({
                "dimensions": {"date": "2024-03-02"},
                "sum": {"requests": 0, "cachedRequests": 0}
            })),
        ];

        let table = transformer().transform(&records).unwrap();
        let ratio = table.column("cache_ratio").unwrap();
        assert_eq!(ratio[0], &CellValue::Float(33.33));
        assert_eq!(ratio[1], &CellValue::Float(0.0));
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let records = vec![record(json!({
            "dimensions": {"date": "2024-03-01"},
            "sum": {"requests": "1500", "bytes": "2.0e3"}
        }))];

        let table = transformer().transform(&records).unwrap();
        assert_eq!(table.column("requests").unwrap()[0], &CellValue::Integer(1500));
        assert_eq!(table.column("bytes").unwrap()[0], &CellValue::Integer(2000));
    }

    #[test]
    fn test_missing_date_names_the_record() {
        let records = vec![
            record(json!({"dimensions": {"date": "2024-03-01"}})),
            record(json!({"dimensions": {}, "sum": {"requests": 1}})),
        ];

        assert_eq!(
            transformer().transform(&records).unwrap_err(),
            SchemaError::MissingDimension {
                record: 1,
                key: "date".to_string()
            }
        );
    }

    #[test]
    fn test_uncoercible_value_is_an_error() {
        let records = vec![record(json!({
            "dimensions": {"date": "2024-03-01"},
            "sum": {"requests": "lots"}
        }))];

        match transformer().transform(&records).unwrap_err() {
            SchemaError::InvalidValue { record, column, .. } => {
                assert_eq!(record, 0);
                assert_eq!(column, "requests");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bad_date_is_an_error() {
        let records = vec![record(json!({"dimensions": {"date": "March 1st"}}))];
        assert!(matches!(
            transformer().transform(&records),
            Err(SchemaError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_empty_input() {
        let table = transformer().transform(&[]).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_flatten() {
        let map = json!({"sum": {"bytes": 1, "nested": {"deep": true}}, "date": "x"});
        let flat = flatten(map.as_object().unwrap());

        assert_eq!(flat.get("sum.bytes"), Some(&json!(1)));
        assert_eq!(flat.get("sum.nested.deep"), Some(&json!(true)));
        assert_eq!(flat.get("date"), Some(&json!("x")));
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(2.0, 3.0), 66.67);
        assert_eq!(percentage(5.0, 0.0), 0.0);
        assert_eq!(percentage(1.0, 1.0), 100.0);
    }
}
