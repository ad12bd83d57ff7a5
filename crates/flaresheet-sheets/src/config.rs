use std::fmt;
use std::str::FromStr;

use flaresheet_api::RetryPolicy;
use serde::{
    Deserialize,
    Serialize,
};

pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

pub const DATE_PATTERN: &str = "yyyy-mm-dd";

/// How byte counters are written to the sheet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BytesFormat {
    /// Plain integers
    #[default]
    Raw,
    /// `"1.50 MB"` style text, 1024-based
    Human,
}

impl FromStr for BytesFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "human" => Ok(Self::Human),
            other => Err(format!("Unknown bytes format '{other}' (expected raw or human)")),
        }
    }
}

impl fmt::Display for BytesFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Human => write!(f, "human"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploaderSettings {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub bytes_format: BytesFormat,
    /// Write dates as `=DATE(..)` formulas and format the date column
    pub format_dates: bool,
    pub retry_policy: RetryPolicy,
}

impl UploaderSettings {
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            bytes_format: BytesFormat::default(),
            format_dates: true,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_sheet_name(mut self, sheet_name: impl Into<String>) -> Self {
        self.sheet_name = sheet_name.into();
        self
    }

    pub fn with_bytes_format(mut self, bytes_format: BytesFormat) -> Self {
        self.bytes_format = bytes_format;
        self
    }

    pub fn with_format_dates(mut self, format_dates: bool) -> Self {
        self.format_dates = format_dates;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }
}
