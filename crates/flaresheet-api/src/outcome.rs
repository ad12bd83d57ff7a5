use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{
    DateTime,
    Utc,
};
use serde::Serialize;

use crate::types::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

/// Where a run is, or where it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStage {
    Idle,
    Fetching,
    Transforming,
    Uploading,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Transforming => "transforming",
            Self::Uploading => "uploading",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Fetch,
    Schema,
    Auth,
    Upload,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetch => "fetch",
            Self::Schema => "schema",
            Self::Auth => "auth",
            Self::Upload => "upload",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

/// Result of one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub range: TimeRange,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub rows_written: usize,
    /// Stage that failed; `None` on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<RunStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Error messages, outermost first, following `source()`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detail: Vec<String>,
    /// Sums of the integer measure columns that were written
    pub totals: BTreeMap<String, i64>,
}

impl RunOutcome {
    pub fn success(
        range: TimeRange, started_at: DateTime<Utc>, elapsed: Duration, rows_written: usize,
        totals: BTreeMap<String, i64>,
    ) -> Self {
        Self {
            status: RunStatus::Success,
            range,
            started_at,
            duration_ms: elapsed.as_millis() as u64,
            rows_written,
            failed_stage: None,
            error_kind: None,
            detail: Vec::new(),
            totals,
        }
    }

    pub fn failure(
        range: TimeRange, started_at: DateTime<Utc>, elapsed: Duration, stage: RunStage,
        kind: ErrorKind, error: &(dyn std::error::Error + 'static),
    ) -> Self {
        Self {
            status: RunStatus::Failure,
            range,
            started_at,
            duration_ms: elapsed.as_millis() as u64,
            rows_written: 0,
            failed_stage: Some(stage),
            error_kind: Some(kind),
            detail: error_chain(error),
            totals: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Renders an error and its sources, outermost first
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if chain.last() != Some(&text) {
            chain.push(text);
        }
        source = cause.source();
    }
    chain
}
