//! Settings for the Cloudflare fetcher

use flaresheet_api::RetryPolicy;

pub const DEFAULT_GRAPHQL_URL: &str = "https://api.cloudflare.com/client/v4/graphql";

/// Groups requested per GraphQL call
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Widest date window sent in a single query
pub const DEFAULT_MAX_RANGE_DAYS: u32 = 31;

#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub zone_id: String,
    pub page_size: u32,
    pub max_range_days: u32,
    pub retry_policy: RetryPolicy,
}

impl FetcherSettings {
    pub fn new(zone_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            page_size: DEFAULT_PAGE_SIZE,
            max_range_days: DEFAULT_MAX_RANGE_DAYS,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_range_days(mut self, days: u32) -> Self {
        self.max_range_days = days.max(1);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// Zone tags are 32 hex characters
pub fn is_valid_zone_id(zone_id: &str) -> bool {
    zone_id.len() == 32 && zone_id.chars().all(|c| c.is_ascii_hexdigit())
}
