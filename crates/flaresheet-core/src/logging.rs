use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub const DEFAULT_LOG_FILTER: &str = "flaresheet=info,flaresheet_core=info,flaresheet_api=info,\
                                      flaresheet_cloudflare=info,flaresheet_sheets=info";

/// Set to `json` for one JSON object per line
pub const LOG_FORMAT_ENV: &str = "FLARESHEET_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

pub fn init() {
    init_with_default(DEFAULT_LOG_FILTER);
}

pub fn init_with_default(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);

    match LogFormat::from_env() {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init(),
    }
}

pub fn init_dev() {
    init_with_default(
        "flaresheet=debug,flaresheet_core=debug,flaresheet_api=debug,\
         flaresheet_cloudflare=debug,flaresheet_sheets=debug",
    );
}
