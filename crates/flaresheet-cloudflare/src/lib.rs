//! Cloudflare Analytics source for flaresheet
//!
//! Pulls daily zone traffic (`httpRequests1dGroups`) from the Cloudflare
//! GraphQL Analytics API.
//!
//! # Architecture
//!
//! - `fetcher` - the [`MetricsSource`](flaresheet_api::MetricsSource)
//!   implementation: range chunking, pagination, retry
//! - `client` - the transport seam and its reqwest implementation
//! - `types` - GraphQL response shapes
//! - `mapper` - response groups to raw metric records
//! - `schema` - the column layout daily traffic normalises into
//! - `config` - fetcher settings and defaults
//!
//! # Example Usage
//!
//! ```no_run
//! use flaresheet_cloudflare::{CloudflareFetcher, FetcherSettings, GraphqlClient};
//!
//! # fn demo(http: reqwest::Client) {
//! let transport = GraphqlClient::new(http, "api-token".to_string());
//! let fetcher = CloudflareFetcher::new(transport, FetcherSettings::new("zone-id"));
//! # }
//! ```

mod client;
mod config;
mod fetcher;
mod mapper;
mod schema;
mod types;

pub use client::{
    AnalyticsTransport,
    DailyQuery,
    GraphqlClient,
};
pub use config::{
    is_valid_zone_id,
    FetcherSettings,
    DEFAULT_GRAPHQL_URL,
    DEFAULT_MAX_RANGE_DAYS,
    DEFAULT_PAGE_SIZE,
};
pub use fetcher::CloudflareFetcher;
pub use schema::DAILY_TRAFFIC;
pub use types::{
    DailyGroup,
    GraphqlError,
    GraphqlResponse,
};
