pub mod interpolation;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{
    ConfigLoadError,
    ConfigLoadResult,
    ConfigLoader,
    CONFIG_PATH_ENV,
};
pub use schema::{
    ConfigKey,
    DestinationConfig,
    FlaresheetConfig,
    HttpConfig,
    ProviderConfig,
    RetryConfig,
};
pub use validation::{
    ConfigError,
    ConfigErrorCode,
    ConfigValidator,
    ConfigWarning,
    ValidationResult,
};
