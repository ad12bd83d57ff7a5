use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use flaresheet_api::RetryPolicy;
use flaresheet_cloudflare::{
    DEFAULT_GRAPHQL_URL,
    DEFAULT_MAX_RANGE_DAYS,
    DEFAULT_PAGE_SIZE,
};
use flaresheet_sheets::{
    BytesFormat,
    DEFAULT_SHEET_NAME,
};
use serde::{
    Deserialize,
    Serialize,
};

pub(super) const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub(super) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub(super) const DEFAULT_MAX_ATTEMPTS: u32 = 4;

pub(super) const DEFAULT_INITIAL_DELAY_MS: u64 = 500;

pub(super) const DEFAULT_MAX_DELAY_MS: u64 = 8000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlaresheetConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub destination: DestinationConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl FlaresheetConfig {
    /// Applies the recognised environment keys on top of file values
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in ConfigKey::ALL {
            if let Some(value) = lookup(key.env_var_name()).filter(|v| !v.trim().is_empty()) {
                self.set(key, value);
            }
        }
    }

    fn set(&mut self, key: ConfigKey, value: String) {
        match key {
            ConfigKey::ApiToken => self.provider.api_token = value,
            ConfigKey::ZoneId => self.provider.zone_id = value,
            ConfigKey::SpreadsheetId => self.destination.spreadsheet_id = value,
            ConfigKey::SheetName => self.destination.sheet_name = value,
            ConfigKey::OAuthClientConfig => self.destination.oauth_client_config = value,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing)]
    pub api_token: String,

    #[serde(default)]
    pub zone_id: String,

    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_max_range_days")]
    pub max_range_days: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            zone_id: String::new(),
            graphql_url: default_graphql_url(),
            page_size: default_page_size(),
            max_range_days: default_max_range_days(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_token", &redacted(&self.api_token))
            .field("zone_id", &self.zone_id)
            .field("graphql_url", &self.graphql_url)
            .field("page_size", &self.page_size)
            .field("max_range_days", &self.max_range_days)
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "[REDACTED]"
    }
}

fn default_graphql_url() -> String {
    DEFAULT_GRAPHQL_URL.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_max_range_days() -> u32 {
    DEFAULT_MAX_RANGE_DAYS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    #[serde(default)]
    pub spreadsheet_id: String,

    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// Path to the Google OAuth client JSON; `~` is expanded
    #[serde(default)]
    pub oauth_client_config: String,

    #[serde(default)]
    pub bytes_format: BytesFormat,

    #[serde(default = "default_format_dates")]
    pub format_dates: bool,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            sheet_name: default_sheet_name(),
            oauth_client_config: String::new(),
            bytes_format: BytesFormat::default(),
            format_dates: default_format_dates(),
        }
    }
}

impl DestinationConfig {
    pub fn oauth_client_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.oauth_client_config).into_owned())
    }
}

fn default_sheet_name() -> String {
    DEFAULT_SHEET_NAME.to_string()
}

fn default_format_dates() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: None,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            jitter: self.jitter,
            ..RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.initial_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

fn default_jitter() -> bool {
    true
}

/// Settings that can be supplied through the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ApiToken,
    ZoneId,
    SpreadsheetId,
    SheetName,
    OAuthClientConfig,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        Self::ApiToken,
        Self::ZoneId,
        Self::SpreadsheetId,
        Self::SheetName,
        Self::OAuthClientConfig,
    ];

    pub fn env_var_name(&self) -> &'static str {
        match self {
            Self::ApiToken => "PROVIDER_API_TOKEN",
            Self::ZoneId => "PROVIDER_ZONE_ID",
            Self::SpreadsheetId => "DEST_SPREADSHEET_ID",
            Self::SheetName => "DEST_SHEET_NAME",
            Self::OAuthClientConfig => "OAUTH_CLIENT_CONFIG",
        }
    }

    /// Dotted config field the key overrides
    pub fn field(&self) -> &'static str {
        match self {
            Self::ApiToken => "provider.api_token",
            Self::ZoneId => "provider.zone_id",
            Self::SpreadsheetId => "destination.spreadsheet_id",
            Self::SheetName => "destination.sheet_name",
            Self::OAuthClientConfig => "destination.oauth_client_config",
        }
    }
}
