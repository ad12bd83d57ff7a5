use reqwest::Client;
use thiserror::Error;

use crate::config::HttpConfig;

pub const DEFAULT_USER_AGENT: &str = concat!("flaresheet/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
#[error("Failed to create HTTP client: {0}")]
pub struct HttpClientError(#[from] reqwest::Error);

/// Installs the ring provider for rustls; repeated calls are harmless
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Builds the client shared by the provider and destination integrations
pub fn build_client(config: &HttpConfig) -> Result<Client, HttpClientError> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    Ok(Client::builder()
        .use_rustls_tls()
        .user_agent(user_agent)
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .pool_max_idle_per_host(2)
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client() {
        install_crypto_provider();
        let config = HttpConfig {
            timeout_secs: 5,
            connect_timeout_secs: 2,
            user_agent: Some("flaresheet-test".to_string()),
        };
        assert!(build_client(&config).is_ok());
    }

    #[test]
    fn test_default_user_agent_names_crate() {
        assert!(DEFAULT_USER_AGENT.starts_with("flaresheet/"));
    }
}
