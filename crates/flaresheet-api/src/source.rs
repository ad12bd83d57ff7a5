use async_trait::async_trait;

use crate::error::{
    FetchResult,
    SinkError,
};
use crate::types::{
    MetricRecord,
    MetricTable,
    TableSchema,
    TimeRange,
};

/// A reporting API that metrics are extracted from
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Short identifier used in log records
    fn name(&self) -> &'static str;

    /// Column layout the records of this source normalise into
    fn schema(&self) -> &'static TableSchema;

    /// Fetches every record for the range, oldest first
    ///
    /// An empty period is not an error.
    async fn fetch(&self, range: &TimeRange) -> FetchResult<Vec<MetricRecord>>;
}

/// A destination that normalised tables are loaded into
#[async_trait]
pub trait TableSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Writes the table for `range` and returns the number of rows written
    ///
    /// Writing the same table for the same range twice must leave the
    /// destination exactly as a single write would.
    async fn upload(&self, table: &MetricTable, range: &TimeRange) -> Result<usize, SinkError>;
}
