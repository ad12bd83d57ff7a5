use std::fmt;

use flaresheet_cloudflare::is_valid_zone_id;

use super::schema::{
    ConfigKey,
    FlaresheetConfig,
};

/// Sheet titles longer than this are rejected by Google
const MAX_SHEET_NAME_LEN: usize = 100;

/// Widest window the daily analytics dataset accepts in one query
const MAX_QUERY_RANGE_DAYS: u32 = 366;

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<ConfigWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: &str, message: impl Into<String>, code: ConfigErrorCode) {
        self.errors.push(ConfigError {
            field: field.to_string(),
            message: message.into(),
            code,
        });
    }

    pub fn add_warning(&mut self, field: &str, message: impl Into<String>) {
        self.warnings.push(ConfigWarning {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn summary(&self) -> String {
        if self.errors.is_empty() && self.warnings.is_empty() {
            "Configuration is valid".to_string()
        } else {
            format!(
                "{} error(s), {} warning(s)",
                self.errors.len(),
                self.warnings.len()
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub field: String,
    pub message: String,
    pub code: ConfigErrorCode,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.field, self.message, self.code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorCode {
    MissingRequired,
    InvalidValue,
    FileNotFound,
}

impl fmt::Display for ConfigErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequired => write!(f, "MISSING_REQUIRED"),
            Self::InvalidValue => write!(f, "INVALID_VALUE"),
            Self::FileNotFound => write!(f, "FILE_NOT_FOUND"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub struct ConfigValidator;

impl ConfigValidator {
    /// Checks everything that can be checked without a network call
    pub fn validate(config: &FlaresheetConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_provider(config, &mut result);
        Self::validate_destination(config, &mut result);
        Self::validate_http(config, &mut result);
        Self::validate_retry(config, &mut result);

        result
    }

    fn require(value: &str, key: ConfigKey, result: &mut ValidationResult) -> bool {
        if value.trim().is_empty() {
            result.add_error(
                key.field(),
                format!(
                    "Required; set it in the config file or via {}",
                    key.env_var_name()
                ),
                ConfigErrorCode::MissingRequired,
            );
            return false;
        }
        true
    }

    fn validate_provider(config: &FlaresheetConfig, result: &mut ValidationResult) {
        let provider = &config.provider;

        Self::require(&provider.api_token, ConfigKey::ApiToken, result);

        if Self::require(&provider.zone_id, ConfigKey::ZoneId, result)
            && !is_valid_zone_id(&provider.zone_id)
        {
            result.add_error(
                "provider.zone_id",
                "Zone id must be 32 hexadecimal characters",
                ConfigErrorCode::InvalidValue,
            );
        }

        if !provider.graphql_url.starts_with("https://")
            && !provider.graphql_url.starts_with("http://")
        {
            result.add_error(
                "provider.graphql_url",
                format!("'{}' is not an http(s) URL", provider.graphql_url),
                ConfigErrorCode::InvalidValue,
            );
        }

        if provider.page_size == 0 {
            result.add_error(
                "provider.page_size",
                "Must be at least 1",
                ConfigErrorCode::InvalidValue,
            );
        }

        if provider.max_range_days == 0 {
            result.add_error(
                "provider.max_range_days",
                "Must be at least 1",
                ConfigErrorCode::InvalidValue,
            );
        } else if provider.max_range_days > MAX_QUERY_RANGE_DAYS {
            result.add_warning(
                "provider.max_range_days",
                format!(
                    "Cloudflare rejects daily queries spanning more than {MAX_QUERY_RANGE_DAYS} days"
                ),
            );
        }
    }

    fn validate_destination(config: &FlaresheetConfig, result: &mut ValidationResult) {
        let destination = &config.destination;

        Self::require(&destination.spreadsheet_id, ConfigKey::SpreadsheetId, result);

        if Self::require(&destination.sheet_name, ConfigKey::SheetName, result)
            && destination.sheet_name.chars().count() > MAX_SHEET_NAME_LEN
        {
            result.add_error(
                "destination.sheet_name",
                format!("Sheet names are limited to {MAX_SHEET_NAME_LEN} characters"),
                ConfigErrorCode::InvalidValue,
            );
        }

        if Self::require(
            &destination.oauth_client_config,
            ConfigKey::OAuthClientConfig,
            result,
        ) {
            let path = destination.oauth_client_path();
            if !path.is_file() {
                result.add_error(
                    "destination.oauth_client_config",
                    format!("No such file: {}", path.display()),
                    ConfigErrorCode::FileNotFound,
                );
            }
        }
    }

    fn validate_http(config: &FlaresheetConfig, result: &mut ValidationResult) {
        if config.http.timeout_secs == 0 {
            result.add_error(
                "http.timeout_secs",
                "Must be at least 1",
                ConfigErrorCode::InvalidValue,
            );
        }
        if config.http.connect_timeout_secs == 0 {
            result.add_error(
                "http.connect_timeout_secs",
                "Must be at least 1",
                ConfigErrorCode::InvalidValue,
            );
        }
    }

    fn validate_retry(config: &FlaresheetConfig, result: &mut ValidationResult) {
        let retry = &config.retry;

        if retry.max_attempts == 0 {
            result.add_error(
                "retry.max_attempts",
                "Must be at least 1",
                ConfigErrorCode::InvalidValue,
            );
        }

        if retry.initial_delay_ms > retry.max_delay_ms {
            result.add_warning(
                "retry.initial_delay_ms",
                "Larger than retry.max_delay_ms; every wait will be capped",
            );
        }
    }
}
