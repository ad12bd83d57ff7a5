use std::path::{
    Path,
    PathBuf,
};

use flaresheet_api::AuthError;
use thiserror::Error;

use super::interpolation::{
    interpolate_toml,
    InterpolationError,
};
use super::schema::FlaresheetConfig;
use super::validation::{
    ConfigError,
    ConfigValidator,
};
use crate::http_client::HttpClientError;

pub const CONFIG_PATH_ENV: &str = "FLARESHEET_CONFIG_PATH";

const SYSTEM_CONFIG_PATH: &str = "/etc/flaresheet/config.toml";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Environment variable interpolation failed: {0}")]
    InterpolationError(#[from] InterpolationError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration has {} error(s): {}", .0.len(), join_errors(.0))]
    Validation(Vec<ConfigError>),

    #[error("Failed to load OAuth client config")]
    OAuthClient(#[from] AuthError),

    #[error(transparent)]
    HttpClient(#[from] HttpClientError),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type ConfigLoadResult<T> = Result<T, ConfigLoadError>;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Finds the config file, if there is one
    ///
    /// An explicit `FLARESHEET_CONFIG_PATH` is returned even when missing so
    /// the caller reports it; the well-known locations are only returned
    /// when they exist.
    pub fn discover_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            tracing::debug!("Using config path from {}: {}", CONFIG_PATH_ENV, path);
            return Some(PathBuf::from(path));
        }

        let candidates = [
            Some(PathBuf::from(SYSTEM_CONFIG_PATH)),
            dirs::config_dir().map(|dir| dir.join("flaresheet").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        let found = candidates.into_iter().flatten().find(|path| path.is_file());
        match &found {
            Some(path) => tracing::debug!("Using config file: {}", path.display()),
            None => tracing::debug!("No config file found, using environment only"),
        }
        found
    }

    /// Discovers, loads and validates the configuration
    pub fn load_default() -> ConfigLoadResult<FlaresheetConfig> {
        let path = Self::discover_config_path();
        Self::load(path.as_deref())
    }

    pub fn load(path: Option<&Path>) -> ConfigLoadResult<FlaresheetConfig> {
        Self::load_with(path, &|name| std::env::var(name).ok())
    }

    /// Loads with an explicit environment lookup
    pub fn load_with(
        path: Option<&Path>, lookup: &dyn Fn(&str) -> Option<String>,
    ) -> ConfigLoadResult<FlaresheetConfig> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigLoadError::FileNotFound(path.to_path_buf()));
                }
                let content = std::fs::read_to_string(path)?;
                Self::parse(&content, lookup)?
            }
            None => FlaresheetConfig::default(),
        };

        config.apply_overrides(|name| lookup(name));

        let validation = ConfigValidator::validate(&config);
        for warning in &validation.warnings {
            tracing::warn!(field = %warning.field, "{}", warning.message);
        }
        if !validation.is_ok() {
            tracing::debug!("Config validation failed: {}", validation.summary());
            return Err(ConfigLoadError::Validation(validation.errors));
        }

        tracing::debug!(
            zone = %config.provider.zone_id,
            sheet = %config.destination.sheet_name,
            "Loaded config"
        );

        Ok(config)
    }

    /// Parses TOML and interpolates `${VAR}` references, without validation
    pub fn parse(
        content: &str, lookup: &dyn Fn(&str) -> Option<String>,
    ) -> ConfigLoadResult<FlaresheetConfig> {
        let mut value: toml::Value = toml::from_str(content)?;

        interpolate_toml(&mut value, lookup)?;

        value.try_into().map_err(|e| {
            ConfigLoadError::InvalidConfig(format!("Failed to deserialize config: {e}"))
        })
    }
}
