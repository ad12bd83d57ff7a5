use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use flaresheet_api::{
    CallError,
    FetchError,
    FetchResult,
    MetricRecord,
    MetricsSource,
    RetryFailure,
    Retryable,
    TableSchema,
    TimeRange,
};
use tracing::{
    debug,
    info,
};

use crate::client::{
    AnalyticsTransport,
    DailyQuery,
};
use crate::config::FetcherSettings;
use crate::mapper;
use crate::schema::DAILY_TRAFFIC;
use crate::types::{
    DailyGroup,
    GraphqlResponse,
};

/// Daily traffic source for one Cloudflare zone
pub struct CloudflareFetcher {
    transport: Arc<dyn AnalyticsTransport>,
    settings: FetcherSettings,
}

#[derive(Debug)]
enum PageError {
    Call(CallError),
    Query(String),
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call(e) => write!(f, "{e}"),
            Self::Query(msg) => write!(f, "{msg}"),
        }
    }
}

impl Retryable for PageError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Call(e) => e.is_transient(),
            Self::Query(_) => false,
        }
    }
}

impl CloudflareFetcher {
    pub fn new<T: AnalyticsTransport + 'static>(transport: T, settings: FetcherSettings) -> Self {
        Self::from_shared(Arc::new(transport), settings)
    }

    pub fn from_shared(transport: Arc<dyn AnalyticsTransport>, settings: FetcherSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &FetcherSettings {
        &self.settings
    }

    async fn fetch_chunk(&self, chunk: &TimeRange) -> FetchResult<Vec<MetricRecord>> {
        let mut records = Vec::new();
        let mut cursor = chunk.start();

        loop {
            let page_range = TimeRange::new(cursor, chunk.end()).map_err(FetchError::Query)?;
            let query = DailyQuery {
                zone_tag: self.settings.zone_id.clone(),
                range: page_range,
                limit: self.settings.page_size,
            };

            let groups = self.fetch_page(&query).await?;
            let page_len = groups.len();
            let last_date = groups.last().map(mapper::group_date);

            debug!(range = %page_range, groups = page_len, "Fetched page");
            records.extend(groups.into_iter().map(mapper::group_to_record));

            if page_len < self.settings.page_size as usize {
                break;
            }

            match last_date {
                Some(Some(last)) if last >= cursor => {
                    if last >= chunk.end() {
                        break;
                    }
                    cursor = last + Duration::days(1);
                }
                Some(Some(last)) => {
                    return Err(FetchError::Query(format!(
                        "pagination cursor moved backwards: page for {page_range} ended at {last}"
                    )));
                }
                _ => {
                    return Err(FetchError::Query(
                        "cannot continue pagination: last group of a full page has no date"
                            .to_string(),
                    ));
                }
            }
        }

        Ok(records)
    }

    async fn fetch_page(&self, query: &DailyQuery) -> FetchResult<Vec<DailyGroup>> {
        self.settings
            .retry_policy
            .retry("cloudflare analytics query", || async {
                let response = self
                    .transport
                    .query_daily(query)
                    .await
                    .map_err(PageError::Call)?;
                extract_groups(response)
            })
            .await
            .map_err(fetch_error)
    }
}

fn extract_groups(response: GraphqlResponse) -> Result<Vec<DailyGroup>, PageError> {
    if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
        let message = errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        let rate_limited = errors.iter().any(|e| {
            e.code() == Some("rate_limited") || e.message.to_lowercase().contains("rate limit")
        });
        if rate_limited {
            return Err(PageError::Call(CallError::Status {
                status: 429,
                message,
            }));
        }
        return Err(PageError::Query(message));
    }

    let zones = response
        .data
        .map(|d| d.viewer.zones)
        .ok_or_else(|| PageError::Query("response carries no data".to_string()))?;

    let zone = zones.into_iter().next().ok_or_else(|| {
        PageError::Query("response has no zone data; check the zone id and token scope".to_string())
    })?;

    Ok(zone.http_requests_1d_groups)
}

fn fetch_error(failure: RetryFailure<PageError>) -> FetchError {
    match failure.error {
        PageError::Query(message) => FetchError::Query(message),
        PageError::Call(error) if failure.exhausted => FetchError::RetriesExhausted {
            attempts: failure.attempts,
            last_status: error.status(),
            cause: error.to_string(),
        },
        PageError::Call(error) => FetchError::Rejected {
            status: error.status(),
            cause: error.to_string(),
        },
    }
}

#[async_trait]
impl MetricsSource for CloudflareFetcher {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    fn schema(&self) -> &'static TableSchema {
        &DAILY_TRAFFIC
    }

    async fn fetch(&self, range: &TimeRange) -> FetchResult<Vec<MetricRecord>> {
        let chunks = range.split(self.settings.max_range_days);
        info!(
            zone = %self.settings.zone_id,
            range = %range,
            chunks = chunks.len(),
            "Fetching Cloudflare analytics"
        );

        let mut records = Vec::new();
        for chunk in &chunks {
            records.extend(self.fetch_chunk(chunk).await?);
        }

        if records.is_empty() {
            info!(range = %range, "No analytics data for the period");
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{
        BTreeMap,
        VecDeque,
    };
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use flaresheet_api::RetryPolicy;
    use serde_json::json;

    use super::*;

    /// In-memory provider that enforces a maximum query window
    struct FakeProvider {
        days: BTreeMap<NaiveDate, DailyGroup>,
        max_range_days: i64,
        failures: Mutex<VecDeque<CallError>>,
        queries: Mutex<Vec<DailyQuery>>,
    }

    impl FakeProvider {
        fn new(days: impl IntoIterator<Item = (u32, u32, u64)>, max_range_days: i64) -> Self {
            let days = days
                .into_iter()
                .map(|(month, day, requests)| {
                    let date = NaiveDate::from_ymd_opt(2024, month, day).unwrap();
                    let group: DailyGroup = serde_json::from_value(json!({
                        "dimensions": {"date": date.format("%Y-%m-%d").to_string()},
                        "sum": {"requests": requests, "bytes": requests * 100},
                        "uniq": {"uniques": 1}
                    }))
                    .unwrap();
                    (date, group)
                })
                .collect();

            Self {
                days,
                max_range_days,
                failures: Mutex::new(VecDeque::new()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn fail_with(self, errors: impl IntoIterator<Item = CallError>) -> Self {
            self.failures.lock().unwrap().extend(errors);
            self
        }

        fn query_count(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AnalyticsTransport for FakeProvider {
        async fn query_daily(&self, query: &DailyQuery) -> Result<GraphqlResponse, CallError> {
            self.queries.lock().unwrap().push(query.clone());

            if let Some(error) = self.failures.lock().unwrap().pop_front() {
                return Err(error);
            }

            if query.range.days() > self.max_range_days {
                return Err(CallError::from_status(400, "query range exceeds limit"));
            }

            let groups = self
                .days
                .range(query.range.start()..=query.range.end())
                .take(query.limit as usize)
                .map(|(_, g)| g.clone())
                .collect();

            Ok(GraphqlResponse::with_groups(groups))
        }
    }

    fn march() -> TimeRange {
        TimeRange::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap()
    }

    fn fetcher(provider: Arc<FakeProvider>, settings: FetcherSettings) -> CloudflareFetcher {
        CloudflareFetcher::from_shared(provider, settings)
    }

    fn settings() -> FetcherSettings {
        FetcherSettings::new("zone").with_retry_policy(RetryPolicy::immediate(3))
    }

    fn dates(records: &[MetricRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.dimension("date").unwrap().as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_three_days() {
        let provider = Arc::new(FakeProvider::new([(3, 3, 30), (3, 1, 10), (3, 2, 20)], 31));
        let records = fetcher(provider.clone(), settings())
            .fetch(&march())
            .await
            .unwrap();

        assert_eq!(dates(&records), vec!["2024-03-01", "2024-03-02", "2024-03-03"]);
        assert_eq!(provider.query_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_period_is_not_an_error() {
        let provider = Arc::new(FakeProvider::new(Vec::<(u32, u32, u64)>::new(), 31));
        let records = fetcher(provider, settings()).fetch(&march()).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_pagination_follows_cursor() {
        let days: Vec<_> = (1..=31).map(|d| (3, d, u64::from(d))).collect();
        let provider = Arc::new(FakeProvider::new(days, 31));
        let records = fetcher(provider.clone(), settings().with_page_size(10))
            .fetch(&march())
            .await
            .unwrap();

        assert_eq!(records.len(), 31);
        // 10 + 10 + 10 + 1
        assert_eq!(provider.query_count(), 4);
        let queries = provider.queries.lock().unwrap();
        assert_eq!(queries[1].range.start(), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
    }

    #[tokio::test]
    async fn test_chunked_fetch_matches_unchunked() {
        let days: Vec<_> = (1..=29)
            .map(|d| (2, d, u64::from(d)))
            .chain((1..=31).map(|d| (3, d, u64::from(d) + 100)))
            .collect();
        let range = TimeRange::new(
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap();

        let limited = Arc::new(FakeProvider::new(days.clone(), 14));
        let chunked = fetcher(limited.clone(), settings().with_max_range_days(14))
            .fetch(&range)
            .await
            .unwrap();

        let unlimited = Arc::new(FakeProvider::new(days, 366));
        let single = fetcher(unlimited.clone(), settings().with_max_range_days(366))
            .fetch(&range)
            .await
            .unwrap();

        assert_eq!(chunked, single);
        assert_eq!(chunked.len(), 60);
        assert_eq!(limited.query_count(), 5);
        assert_eq!(unlimited.query_count(), 1);
        for query in limited.queries.lock().unwrap().iter() {
            assert!(query.range.days() <= 14);
        }
    }

    #[tokio::test]
    async fn test_range_over_limit_without_chunking_is_rejected() {
        let provider = Arc::new(FakeProvider::new([(3, 1, 1)], 7));
        let err = fetcher(provider.clone(), settings())
            .fetch(&march())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Rejected { status: Some(400), .. }));
        assert_eq!(provider.query_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_recover_within_ceiling() {
        let provider = Arc::new(
            FakeProvider::new([(3, 1, 1)], 31).fail_with([
                CallError::from_status(429, "slow down"),
                CallError::Network("connection reset".into()),
            ]),
        );
        let records = fetcher(provider.clone(), settings())
            .fetch(&march())
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(provider.query_count(), 3);
    }

    #[tokio::test]
    async fn test_persistent_failures_exhaust_retries() {
        let provider = Arc::new(
            FakeProvider::new([(3, 1, 1)], 31)
                .fail_with((0..10).map(|_| CallError::from_status(502, "bad gateway"))),
        );
        let err = fetcher(provider.clone(), settings())
            .fetch(&march())
            .await
            .unwrap_err();

        match err {
            FetchError::RetriesExhausted {
                attempts,
                last_status,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_status, Some(502));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.query_count(), 3);
    }

    #[tokio::test]
    async fn test_unauthorized_aborts_immediately() {
        let provider = Arc::new(
            FakeProvider::new([(3, 1, 1)], 31)
                .fail_with([CallError::from_status(401, "invalid token")]),
        );
        let err = fetcher(provider.clone(), settings())
            .fetch(&march())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Rejected { status: Some(401), .. }));
        assert_eq!(provider.query_count(), 1);
    }

    #[test]
    fn test_graphql_errors_are_classified() {
        let rate_limited: GraphqlResponse = serde_json::from_value(json!({
            "data": null,
            "errors": [{"message": "rate limiter budget depleted", "extensions": {"code": "rate_limited"}}]
        }))
        .unwrap();
        assert!(extract_groups(rate_limited).unwrap_err().is_transient());

        let bad_query: GraphqlResponse = serde_json::from_value(json!({
            "data": null,
            "errors": [{"message": "unknown field"}]
        }))
        .unwrap();
        assert!(!extract_groups(bad_query).unwrap_err().is_transient());

        let no_zone: GraphqlResponse =
            serde_json::from_value(json!({"data": {"viewer": {"zones": []}}})).unwrap();
        assert!(matches!(extract_groups(no_zone), Err(PageError::Query(_))));
    }
}
