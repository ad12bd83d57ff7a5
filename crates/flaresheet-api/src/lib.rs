//! Shared building blocks for flaresheet
//!
//! Everything the provider and destination integrations have in common
//! lives here: the data model flowing through the pipeline, the error
//! taxonomy, the bounded retry policy, and the two seams
//! ([`MetricsSource`] and [`TableSink`]) the pipeline runner is written
//! against.

pub mod error;
pub mod outcome;
pub mod source;
pub mod types;
pub mod utils;

pub use error::{
    AuthError,
    AuthResult,
    CallError,
    FetchError,
    FetchResult,
    Retryable,
    SchemaError,
    SchemaResult,
    SinkError,
    UploadError,
    UploadResult,
};
pub use outcome::{
    error_chain,
    ErrorKind,
    RunOutcome,
    RunStage,
    RunStatus,
};
pub use source::{
    MetricsSource,
    TableSink,
};
pub use types::{
    row_key,
    CellValue,
    ColumnRole,
    ColumnSource,
    ColumnSpec,
    ColumnType,
    MetricRecord,
    MetricTable,
    MissingValue,
    Row,
    TableSchema,
    TimeRange,
};
pub use utils::{
    RetryFailure,
    RetryPolicy,
};
