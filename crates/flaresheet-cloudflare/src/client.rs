//! HTTP transport for the Cloudflare GraphQL Analytics API

use async_trait::async_trait;
use flaresheet_api::{
    CallError,
    TimeRange,
};
use reqwest::Client;
use secrecy::{
    ExposeSecret,
    SecretString,
};
use tracing::debug;

use crate::config::DEFAULT_GRAPHQL_URL;
use crate::types::GraphqlResponse;

const DAILY_TRAFFIC_QUERY: &str = r#"
query ZoneDailyTraffic($zoneTag: String!, $start: Date!, $end: Date!, $limit: Int!) {
  viewer {
    zones(filter: { zoneTag: $zoneTag }) {
      httpRequests1dGroups(
        limit: $limit,
        orderBy: [date_ASC],
        filter: { date_geq: $start, date_leq: $end }
      ) {
        dimensions {
          date
        }
        sum {
          bytes
          cachedBytes
          requests
          cachedRequests
          pageViews
          threats
        }
        uniq {
          uniques
        }
      }
    }
  }
}
"#;

/// One page request for daily traffic groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyQuery {
    pub zone_tag: String,
    pub range: TimeRange,
    pub limit: u32,
}

impl DailyQuery {
    fn variables(&self) -> serde_json::Value {
        serde_json::json!({
            "zoneTag": self.zone_tag,
            "start": self.range.start().format("%Y-%m-%d").to_string(),
            "end": self.range.end().format("%Y-%m-%d").to_string(),
            "limit": self.limit,
        })
    }
}

/// Executes a single analytics query, without retries
#[async_trait]
pub trait AnalyticsTransport: Send + Sync {
    async fn query_daily(&self, query: &DailyQuery) -> Result<GraphqlResponse, CallError>;
}

/// Cloudflare GraphQL client authenticated with an API token
pub struct GraphqlClient {
    client: Client,
    endpoint: String,
    api_token: SecretString,
}

impl GraphqlClient {
    pub fn new(client: Client, api_token: String) -> Self {
        Self {
            client,
            endpoint: DEFAULT_GRAPHQL_URL.to_string(),
            api_token: api_token.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl AnalyticsTransport for GraphqlClient {
    async fn query_daily(&self, query: &DailyQuery) -> Result<GraphqlResponse, CallError> {
        debug!(
            zone = %query.zone_tag,
            range = %query.range,
            limit = query.limit,
            "Querying daily traffic"
        );

        let body = serde_json::json!({
            "query": DAILY_TRAFFIC_QUERY,
            "variables": query.variables(),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CallError::from_status(status.as_u16(), &text));
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}
