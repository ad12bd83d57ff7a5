use flaresheet_api::{
    ColumnRole,
    ColumnSource,
    ColumnSpec,
    ColumnType,
    MissingValue,
    TableSchema,
};

const fn counter(name: &'static str, label: &'static str, path: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        label,
        column_type: ColumnType::Integer,
        role: ColumnRole::Measure,
        source: ColumnSource::Measure(path),
        missing: MissingValue::Zero,
    }
}

static DAILY_TRAFFIC_COLUMNS: [ColumnSpec; 9] = [
    ColumnSpec {
        name: "date",
        label: "Date",
        column_type: ColumnType::Date,
        role: ColumnRole::Dimension,
        source: ColumnSource::Dimension("date"),
        missing: MissingValue::Required,
    },
    counter("uniques", "Unique Visitors", "uniq.uniques"),
    counter("page_views", "Page Views", "sum.pageViews"),
    counter("requests", "Total Requests", "sum.requests"),
    counter("cached_requests", "Cached Requests", "sum.cachedRequests"),
    ColumnSpec {
        name: "cache_ratio",
        label: "Cache Ratio (%)",
        column_type: ColumnType::Float,
        role: ColumnRole::Measure,
        source: ColumnSource::Percentage {
            numerator: "cached_requests",
            denominator: "requests",
        },
        missing: MissingValue::Zero,
    },
    counter("bytes", "Total Bytes", "sum.bytes"),
    counter("cached_bytes", "Cached Bytes", "sum.cachedBytes"),
    counter("threats", "Threats", "sum.threats"),
];

/// Daily zone traffic, one row per calendar day
pub static DAILY_TRAFFIC: TableSchema = TableSchema {
    name: "cloudflare_daily_traffic",
    columns: &DAILY_TRAFFIC_COLUMNS,
};
