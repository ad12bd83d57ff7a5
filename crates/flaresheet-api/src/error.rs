use thiserror::Error;

/// Failure of a single HTTP call, before any retry decision is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl CallError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Builds a status error, keeping only the head of long response bodies.
    pub fn from_status(status: u16, body: &str) -> Self {
        const MAX_BODY: usize = 512;
        let message = if body.len() > MAX_BODY {
            let mut end = MAX_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &body[..end])
        } else {
            body.to_string()
        };
        Self::Status { status, message }
    }
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Classifies an error as worth another attempt.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for CallError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Decode(_) => false,
        }
    }
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP {code}"),
        None => "no response".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(
        "Provider request failed after {attempts} attempt(s) ({}): {cause}",
        describe_status(.last_status)
    )]
    RetriesExhausted {
        attempts: u32,
        last_status: Option<u16>,
        cause: String,
    },

    #[error("Provider rejected the request ({}): {cause}", describe_status(.status))]
    Rejected { status: Option<u16>, cause: String },

    #[error("Provider query failed: {0}")]
    Query(String),
}

impl FetchError {
    pub fn last_status(&self) -> Option<u16> {
        match self {
            Self::RetriesExhausted { last_status, .. } => *last_status,
            Self::Rejected { status, .. } => *status,
            Self::Query(_) => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Record {record} is missing required dimension '{key}'")]
    MissingDimension { record: usize, key: String },

    #[error("Record {record} has an invalid value for '{column}': {value}")]
    InvalidValue {
        record: usize,
        column: String,
        value: String,
    },

    #[error("Row {row} does not match schema '{schema}': {reason}")]
    RowMismatch {
        row: usize,
        schema: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token exchange rejected ({}): {cause}", describe_status(.status))]
    Rejected { status: Option<u16>, cause: String },

    #[error(
        "Token endpoint unreachable after {attempts} attempt(s) ({}): {cause}",
        describe_status(.last_status)
    )]
    Unreachable {
        attempts: u32,
        last_status: Option<u16>,
        cause: String,
    },

    #[error("Invalid OAuth client configuration: {0}")]
    InvalidClientConfig(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error(
        "Destination write failed after {attempts} attempt(s) ({}): {cause}",
        describe_status(.last_status)
    )]
    RetriesExhausted {
        attempts: u32,
        last_status: Option<u16>,
        cause: String,
    },

    #[error("Destination rejected the write ({}): {cause}", describe_status(.status))]
    Rejected { status: Option<u16>, cause: String },
}

/// Everything a [`crate::TableSink`] can fail with.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

pub type FetchResult<T> = Result<T, FetchError>;
pub type SchemaResult<T> = Result<T, SchemaError>;
pub type AuthResult<T> = Result<T, AuthError>;
pub type UploadResult<T> = Result<T, UploadError>;
