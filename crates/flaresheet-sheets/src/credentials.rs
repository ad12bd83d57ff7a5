//! OAuth2 credentials for the Google Sheets API
//!
//! Client material comes from the JSON file Google hands out, in either of
//! its two shapes: `authorized_user` (client id/secret plus a refresh token)
//! or `service_account` (a signing key exchanged through a JWT assertion).
//! Access tokens are exchanged lazily and cached in memory for the life of
//! the process only.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{
    DateTime,
    Duration,
    Utc,
};
use flaresheet_api::{
    AuthError,
    AuthResult,
    CallError,
    RetryFailure,
    RetryPolicy,
};
use jsonwebtoken::{
    Algorithm,
    EncodingKey,
    Header,
};
use reqwest::Client;
use secrecy::{
    ExposeSecret,
    SecretString,
};
use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::Mutex;
use tracing::{
    debug,
    info,
};

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens closer than this to expiry are exchanged again
pub const REFRESH_MARGIN_SECS: i64 = 5 * 60;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

const ASSERTION_LIFETIME_SECS: i64 = 3600;

const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Longest token lifetime trusted from the endpoint
const MAX_EXPIRES_IN_SECS: i64 = 24 * 3600;

/// An access token and what is known about it
#[derive(Debug)]
pub struct Credentials {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    expires_at: DateTime<Utc>,
    scopes: Vec<String>,
}

impl Credentials {
    pub fn new(
        access_token: String, refresh_token: Option<String>, expires_at: DateTime<Utc>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.map(Into::into),
            expires_at,
            scopes,
        }
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// True while more than `margin` of lifetime remains at `now`
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - margin > now
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            access_token: self.access_token.expose_secret().to_string().into(),
            refresh_token: self
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_string().into()),
            expires_at: self.expires_at,
            scopes: self.scopes.clone(),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawClientConfig {
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default)]
        token_uri: Option<String>,
    },
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default)]
        private_key_id: Option<String>,
        #[serde(default)]
        token_uri: Option<String>,
    },
}

/// Parsed OAuth client material
#[derive(Debug)]
pub enum OAuthClient {
    AuthorizedUser {
        client_id: String,
        client_secret: SecretString,
        refresh_token: SecretString,
        token_uri: String,
    },
    ServiceAccount {
        client_email: String,
        private_key: SecretString,
        private_key_id: Option<String>,
        token_uri: String,
    },
}

impl OAuthClient {
    pub fn from_json(json: &str) -> AuthResult<Self> {
        let raw: RawClientConfig = serde_json::from_str(json)
            .map_err(|e| AuthError::InvalidClientConfig(format!("Failed to parse: {e}")))?;

        let client = match raw {
            RawClientConfig::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => Self::AuthorizedUser {
                client_id,
                client_secret: client_secret.into(),
                refresh_token: refresh_token.into(),
                token_uri: token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            },
            RawClientConfig::ServiceAccount {
                client_email,
                private_key,
                private_key_id,
                token_uri,
            } => Self::ServiceAccount {
                client_email,
                private_key: private_key.into(),
                private_key_id,
                token_uri: token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            },
        };

        client.check()?;
        Ok(client)
    }

    pub fn load(path: &Path) -> AuthResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AuthError::InvalidClientConfig(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    fn check(&self) -> AuthResult<()> {
        let missing = match self {
            Self::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                ..
            } => [
                ("client_id", client_id.is_empty()),
                ("client_secret", client_secret.expose_secret().is_empty()),
                ("refresh_token", refresh_token.expose_secret().is_empty()),
            ]
            .into_iter()
            .find(|(_, empty)| *empty),
            Self::ServiceAccount {
                client_email,
                private_key,
                ..
            } => [
                ("client_email", client_email.is_empty()),
                ("private_key", private_key.expose_secret().is_empty()),
            ]
            .into_iter()
            .find(|(_, empty)| *empty),
        };

        match missing {
            Some((field, _)) => Err(AuthError::InvalidClientConfig(format!(
                "'{field}' is empty"
            ))),
            None => Ok(()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthorizedUser { .. } => "authorized_user",
            Self::ServiceAccount { .. } => "service_account",
        }
    }

    fn token_uri(&self) -> &str {
        match self {
            Self::AuthorizedUser { token_uri, .. } | Self::ServiceAccount { token_uri, .. } => {
                token_uri
            }
        }
    }

    /// Form fields for one token exchange
    fn grant_form(&self, scopes: &[String], now: DateTime<Utc>) -> AuthResult<Vec<(String, String)>> {
        match self {
            Self::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                ..
            } => Ok(vec![
                ("grant_type".to_string(), "refresh_token".to_string()),
                ("client_id".to_string(), client_id.clone()),
                (
                    "client_secret".to_string(),
                    client_secret.expose_secret().to_string(),
                ),
                (
                    "refresh_token".to_string(),
                    refresh_token.expose_secret().to_string(),
                ),
            ]),
            Self::ServiceAccount {
                client_email,
                private_key,
                private_key_id,
                token_uri,
            } => {
                let assertion = sign_assertion(
                    client_email,
                    private_key,
                    private_key_id.as_deref(),
                    token_uri,
                    scopes,
                    now,
                )?;
                Ok(vec![
                    ("grant_type".to_string(), JWT_BEARER_GRANT.to_string()),
                    ("assertion".to_string(), assertion),
                ])
            }
        }
    }

    fn refresh_token(&self) -> Option<String> {
        match self {
            Self::AuthorizedUser { refresh_token, .. } => {
                Some(refresh_token.expose_secret().to_string())
            }
            Self::ServiceAccount { .. } => None,
        }
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

fn sign_assertion(
    client_email: &str, private_key: &SecretString, private_key_id: Option<&str>, audience: &str,
    scopes: &[String], now: DateTime<Utc>,
) -> AuthResult<String> {
    let key = EncodingKey::from_rsa_pem(private_key.expose_secret().as_bytes())
        .map_err(|e| AuthError::InvalidClientConfig(format!("Invalid private key: {e}")))?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = private_key_id.map(str::to_string);

    let iat = now.timestamp();
    let claims = AssertionClaims {
        iss: client_email,
        scope: scopes.join(" "),
        aud: audience,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    };

    jsonwebtoken::encode(&header, &claims, &key)
        .map_err(|e| AuthError::InvalidClientConfig(format!("Failed to sign assertion: {e}")))
}

/// Successful token endpoint reply
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Performs a single token exchange, without retries
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn exchange(
        &self, token_uri: &str, form: &[(String, String)],
    ) -> Result<TokenResponse, CallError>;
}

pub struct HttpTokenEndpoint {
    client: Client,
}

impl HttpTokenEndpoint {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange(
        &self, token_uri: &str, form: &[(String, String)],
    ) -> Result<TokenResponse, CallError> {
        let response = self.client.post(token_uri).form(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CallError::from_status(status.as_u16(), &text));
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Hands out access tokens, exchanging them only when needed
pub struct CredentialProvider {
    client: OAuthClient,
    endpoint: Arc<dyn TokenEndpoint>,
    retry_policy: RetryPolicy,
    scopes: Vec<String>,
    refresh_margin: Duration,
    cached: Mutex<Option<Credentials>>,
}

impl CredentialProvider {
    pub fn new<E: TokenEndpoint + 'static>(client: OAuthClient, endpoint: E) -> Self {
        Self::from_shared(client, Arc::new(endpoint))
    }

    pub fn from_shared(client: OAuthClient, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            client,
            endpoint,
            retry_policy: RetryPolicy::default(),
            scopes: vec![SPREADSHEETS_SCOPE.to_string()],
            refresh_margin: Duration::seconds(REFRESH_MARGIN_SECS),
            cached: Mutex::new(None),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Seeds the cache, e.g. with a token obtained earlier
    pub fn with_cached(self, credentials: Credentials) -> Self {
        Self {
            cached: Mutex::new(Some(credentials)),
            ..self
        }
    }

    pub fn client_kind(&self) -> &'static str {
        self.client.kind()
    }

    pub async fn get_credentials(&self) -> AuthResult<Credentials> {
        self.get_credentials_at(Utc::now()).await
    }

    /// Returns cached credentials when still fresh at `now`, else exchanges
    pub async fn get_credentials_at(&self, now: DateTime<Utc>) -> AuthResult<Credentials> {
        let mut cached = self.cached.lock().await;

        if let Some(credentials) = cached.as_ref() {
            if credentials.is_fresh_at(now, self.refresh_margin) {
                return Ok(credentials.clone());
            }
            debug!(
                expires_at = %credentials.expires_at(),
                "Cached access token is expired or about to expire"
            );
        }

        let fresh = self.exchange(now).await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    async fn exchange(&self, now: DateTime<Utc>) -> AuthResult<Credentials> {
        let form = self.client.grant_form(&self.scopes, now)?;
        let token_uri = self.client.token_uri();

        let response = self
            .retry_policy
            .retry("oauth token exchange", || async {
                self.endpoint.exchange(token_uri, &form).await
            })
            .await
            .map_err(auth_error)?;

        let expires_in = response
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .clamp(0, MAX_EXPIRES_IN_SECS);
        let scopes = response
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| self.scopes.clone());

        info!(
            client = self.client.kind(),
            expires_in, "Obtained Google API access token"
        );

        Ok(Credentials::new(
            response.access_token,
            response.refresh_token.or_else(|| self.client.refresh_token()),
            now + Duration::seconds(expires_in),
            scopes,
        ))
    }
}

fn auth_error(failure: RetryFailure<CallError>) -> AuthError {
    if failure.exhausted {
        AuthError::Unreachable {
            attempts: failure.attempts,
            last_status: failure.error.status(),
            cause: failure.error.to_string(),
        }
    } else {
        AuthError::Rejected {
            status: failure.error.status(),
            cause: failure.error.to_string(),
        }
    }
}
