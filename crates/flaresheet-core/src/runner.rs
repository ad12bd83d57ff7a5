//! One extract-transform-load run, start to finish

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{
    Duration,
    Instant,
};

use chrono::{
    DateTime,
    Utc,
};
use flaresheet_api::{
    ColumnRole,
    ColumnType,
    ErrorKind,
    FetchError,
    MetricTable,
    MetricsSource,
    RunOutcome,
    RunStage,
    SchemaError,
    SinkError,
    TableSink,
    TimeRange,
};
use flaresheet_cloudflare::{
    CloudflareFetcher,
    FetcherSettings,
    GraphqlClient,
};
use flaresheet_sheets::{
    CredentialProvider,
    HttpTokenEndpoint,
    OAuthClient,
    SheetsClient,
    SheetsUploader,
    UploaderSettings,
};
use reqwest::Client;
use thiserror::Error;
use tracing::{
    debug,
    error,
    info,
};

use crate::config::{
    ConfigLoadError,
    ConfigLoader,
    FlaresheetConfig,
};
use crate::http_client::build_client;
use crate::transform::Transformer;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error")]
    Config(#[from] ConfigLoadError),

    #[error("Failed to fetch metrics")]
    Fetch(#[from] FetchError),

    #[error("Failed to transform metrics")]
    Schema(#[from] SchemaError),

    #[error("Failed to upload table")]
    Sink(#[from] SinkError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::Schema(_) => ErrorKind::Schema,
            Self::Sink(SinkError::Auth(_)) => ErrorKind::Auth,
            Self::Sink(SinkError::Upload(_)) => ErrorKind::Upload,
        }
    }

    /// Stage the run was in when this error stopped it
    pub fn stage(&self) -> RunStage {
        match self {
            Self::Config(_) => RunStage::Idle,
            Self::Fetch(_) => RunStage::Fetching,
            Self::Schema(_) => RunStage::Transforming,
            Self::Sink(_) => RunStage::Uploading,
        }
    }
}

/// Drives fetch, transform and upload for one period
///
/// Holds no state between runs; every call to [`PipelineRunner::run`]
/// produces exactly one [`RunOutcome`].
pub struct PipelineRunner {
    source: Arc<dyn MetricsSource>,
    sink: Arc<dyn TableSink>,
    transformer: Transformer,
}

impl PipelineRunner {
    pub fn new(source: Arc<dyn MetricsSource>, sink: Arc<dyn TableSink>) -> Self {
        let transformer = Transformer::new(source.schema());
        Self {
            source,
            sink,
            transformer,
        }
    }

    /// Loads configuration from `path`, or discovers it, and wires the pipeline
    ///
    /// Every failure here is a [`ErrorKind::Config`] failure and happens
    /// before any network call.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let config = match path {
            Some(path) => ConfigLoader::load(Some(path))?,
            None => ConfigLoader::load_default()?,
        };
        let client = build_client(&config.http).map_err(ConfigLoadError::from)?;
        Self::from_config(&config, client)
    }

    /// Wires the Cloudflare source and the Google Sheets sink from config
    pub fn from_config(config: &FlaresheetConfig, client: Client) -> Result<Self, PipelineError> {
        let policy = config.retry.policy();

        let transport = GraphqlClient::new(client.clone(), config.provider.api_token.clone())
            .with_endpoint(config.provider.graphql_url.clone());
        let fetcher_settings = FetcherSettings::new(config.provider.zone_id.clone())
            .with_page_size(config.provider.page_size)
            .with_max_range_days(config.provider.max_range_days)
            .with_retry_policy(policy.clone());
        let fetcher = CloudflareFetcher::new(transport, fetcher_settings);

        let oauth = OAuthClient::load(&config.destination.oauth_client_path())
            .map_err(ConfigLoadError::from)?;
        let credentials = CredentialProvider::new(oauth, HttpTokenEndpoint::new(client.clone()))
            .with_retry_policy(policy.clone());
        let uploader_settings = UploaderSettings::new(config.destination.spreadsheet_id.clone())
            .with_sheet_name(config.destination.sheet_name.clone())
            .with_bytes_format(config.destination.bytes_format)
            .with_format_dates(config.destination.format_dates)
            .with_retry_policy(policy);
        let credentials = Arc::new(credentials);
        let uploader = SheetsUploader::new(
            SheetsClient::new(client),
            credentials.clone(),
            uploader_settings,
        );

        debug!(
            zone = %fetcher.settings().zone_id,
            max_range_days = fetcher.settings().max_range_days,
            sheet = %uploader.settings().sheet_name,
            oauth_client = credentials.client_kind(),
            "Pipeline configured"
        );

        Ok(Self::new(Arc::new(fetcher), Arc::new(uploader)))
    }

    /// Reports an invocation that failed before a runner could be built
    ///
    /// Produces and logs the same single outcome record a run would, so
    /// every invocation emits exactly one. Without a requested range the
    /// outcome names the period a default run would have covered.
    pub fn setup_failure(
        range: Option<TimeRange>, started_at: DateTime<Utc>, elapsed: Duration,
        error: &PipelineError,
    ) -> RunOutcome {
        let range = range.unwrap_or_else(|| TimeRange::previous_month(started_at));
        let outcome = RunOutcome::failure(
            range,
            started_at,
            elapsed,
            error.stage(),
            error.kind(),
            error,
        );
        log_outcome(&outcome);
        outcome
    }

    /// Runs for `range`, or for the previous calendar month when `None`
    pub async fn run(&self, range: Option<TimeRange>) -> RunOutcome {
        self.run_at(range, Utc::now()).await
    }

    pub async fn run_at(&self, range: Option<TimeRange>, now: DateTime<Utc>) -> RunOutcome {
        let range = range.unwrap_or_else(|| TimeRange::previous_month(now));
        let started = Instant::now();

        info!(
            range = %range,
            source = self.source.name(),
            sink = self.sink.name(),
            "Starting run"
        );

        let outcome = match self.execute(&range).await {
            Ok((rows, totals)) => {
                RunOutcome::success(range, now, started.elapsed(), rows, totals)
            }
            Err(e) => RunOutcome::failure(
                range,
                now,
                started.elapsed(),
                e.stage(),
                e.kind(),
                &e,
            ),
        };

        log_outcome(&outcome);
        outcome
    }

    async fn execute(
        &self, range: &TimeRange,
    ) -> Result<(usize, BTreeMap<String, i64>), PipelineError> {
        debug!(stage = %RunStage::Fetching, "Entering stage");
        let records = self.source.fetch(range).await?;
        info!(records = records.len(), "Fetched records");

        debug!(stage = %RunStage::Transforming, "Entering stage");
        let table = self.transformer.transform(&records)?;

        debug!(stage = %RunStage::Uploading, "Entering stage");
        let rows = self.sink.upload(&table, range).await?;

        Ok((rows, totals(&table)))
    }
}

/// Sums every integer measure column of the table
pub fn totals(table: &MetricTable) -> BTreeMap<String, i64> {
    table
        .schema()
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.role == ColumnRole::Measure && c.column_type == ColumnType::Integer)
        .map(|(i, c)| {
            let sum = table
                .rows()
                .iter()
                .filter_map(|row| row[i].as_i64())
                .fold(0i64, i64::saturating_add);
            (c.name.to_string(), sum)
        })
        .collect()
}

fn log_outcome(outcome: &RunOutcome) {
    let summary = serde_json::to_string(outcome).unwrap_or_default();
    if outcome.is_success() {
        info!(
            status = "success",
            range = %outcome.range,
            rows_written = outcome.rows_written,
            duration_ms = outcome.duration_ms,
            outcome = %summary,
            "Run finished"
        );
    } else {
        error!(
            status = "failure",
            range = %outcome.range,
            stage = ?outcome.failed_stage,
            kind = ?outcome.error_kind,
            duration_ms = outcome.duration_ms,
            outcome = %summary,
            "Run failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{
        NaiveDate,
        TimeZone,
    };
    use flaresheet_api::{
        AuthError,
        CellValue,
        FetchResult,
        MetricRecord,
        RunStatus,
        TableSchema,
        UploadError,
    };
    use flaresheet_cloudflare::DAILY_TRAFFIC;
    use serde_json::{
        json,
        Map,
        Value,
    };

    use super::*;

    struct FakeSource {
        result: Mutex<Option<FetchResult<Vec<MetricRecord>>>>,
        requested: Mutex<Vec<TimeRange>>,
    }

    impl FakeSource {
        fn returning(result: FetchResult<Vec<MetricRecord>>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(result)),
                requested: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MetricsSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake-source"
        }

        fn schema(&self) -> &'static TableSchema {
            &DAILY_TRAFFIC
        }

        async fn fetch(&self, range: &TimeRange) -> FetchResult<Vec<MetricRecord>> {
            self.requested.lock().unwrap().push(*range);
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        failure: Mutex<Option<SinkError>>,
        tables: Mutex<Vec<(MetricTable, TimeRange)>>,
        calls: AtomicUsize,
    }

    impl RecordingSink {
        fn failing(error: SinkError) -> Arc<Self> {
            let sink = Self::default();
            *sink.failure.lock().unwrap() = Some(error);
            Arc::new(sink)
        }
    }

    #[async_trait]
    impl TableSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording-sink"
        }

        async fn upload(&self, table: &MetricTable, range: &TimeRange) -> Result<usize, SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = self.failure.lock().unwrap().take() {
                return Err(error);
            }
            self.tables.lock().unwrap().push((table.clone(), *range));
            Ok(table.len())
        }
    }

    fn record(date: &str, requests: i64, cached: i64, uniques: i64) -> MetricRecord {
        let mut dimensions = Map::new();
        dimensions.insert("date".to_string(), json!(date));
        let mut measures = Map::new();
        measures.insert(
            "sum".to_string(),
            json!({"requests": requests, "cachedRequests": cached, "bytes": requests * 1024}),
        );
        measures.insert("uniq".to_string(), json!({"uniques": uniques}));
        MetricRecord::new(dimensions, measures)
    }

    fn march() -> TimeRange {
        TimeRange::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 0, 5, 0).unwrap()
    }

    #[tokio::test]
    async fn test_march_end_to_end() {
        let source = FakeSource::returning(Ok(vec![
            record("2024-03-03", 300, 150, 30),
            record("2024-03-01", 100, 50, 10),
            record("2024-03-02", 200, 0, 20),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let runner = PipelineRunner::new(source.clone(), sink.clone());

        let outcome = runner.run_at(Some(march()), now()).await;

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.rows_written, 3);
        assert_eq!(outcome.range, march());
        assert_eq!(outcome.totals["requests"], 600);
        assert_eq!(outcome.totals["uniques"], 60);
        assert!(!outcome.totals.contains_key("cache_ratio"));

        let tables = sink.tables.lock().unwrap();
        let (table, range) = &tables[0];
        assert_eq!(*range, march());
        let dates: Vec<String> = table.rows().iter().map(|r| r[0].to_string()).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-03-02", "2024-03-03"]);
        assert_eq!(table.column("cache_ratio").unwrap()[0], &CellValue::Float(50.0));
    }

    #[tokio::test]
    async fn test_defaults_to_previous_month() {
        let source = FakeSource::returning(Ok(Vec::new()));
        let sink = Arc::new(RecordingSink::default());
        let runner = PipelineRunner::new(source.clone(), sink);

        let outcome = runner.run_at(None, now()).await;

        assert_eq!(outcome.range, march());
        assert_eq!(source.requested.lock().unwrap().as_slice(), &[march()]);
    }

    #[tokio::test]
    async fn test_empty_period_succeeds() {
        let source = FakeSource::returning(Ok(Vec::new()));
        let sink = Arc::new(RecordingSink::default());
        let runner = PipelineRunner::new(source, sink.clone());

        let outcome = runner.run_at(Some(march()), now()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.rows_written, 0);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert!(sink.tables.lock().unwrap()[0].0.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_destination_untouched() {
        let source = FakeSource::returning(Err(FetchError::RetriesExhausted {
            attempts: 4,
            last_status: Some(503),
            cause: "service unavailable".into(),
        }));
        let sink = Arc::new(RecordingSink::default());
        let runner = PipelineRunner::new(source, sink.clone());

        let outcome = runner.run_at(Some(march()), now()).await;

        assert_eq!(outcome.status, RunStatus::Failure);
        assert_eq!(outcome.failed_stage, Some(RunStage::Fetching));
        assert_eq!(outcome.error_kind, Some(ErrorKind::Fetch));
        assert_eq!(outcome.detail[0], "Failed to fetch metrics");
        assert!(outcome.detail[1].contains("HTTP 503"));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_record_fails_transform() {
        let mut bad = Map::new();
        bad.insert("host".to_string(), Value::String("example.com".into()));
        let source = FakeSource::returning(Ok(vec![
            record("2024-03-01", 1, 0, 1),
            MetricRecord::new(bad, Map::new()),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let runner = PipelineRunner::new(source, sink.clone());

        let outcome = runner.run_at(Some(march()), now()).await;

        assert_eq!(outcome.failed_stage, Some(RunStage::Transforming));
        assert_eq!(outcome.error_kind, Some(ErrorKind::Schema));
        assert!(outcome.detail[1].contains("Record 1"));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auth_and_upload_failures_are_distinguished() {
        let auth = RecordingSink::failing(SinkError::Auth(AuthError::Rejected {
            status: Some(401),
            cause: "invalid_grant".into(),
        }));
        let outcome = PipelineRunner::new(FakeSource::returning(Ok(Vec::new())), auth)
            .run_at(Some(march()), now())
            .await;
        assert_eq!(outcome.failed_stage, Some(RunStage::Uploading));
        assert_eq!(outcome.error_kind, Some(ErrorKind::Auth));

        let upload = RecordingSink::failing(SinkError::Upload(UploadError::Rejected {
            status: Some(403),
            cause: "The caller does not have permission".into(),
        }));
        let outcome = PipelineRunner::new(FakeSource::returning(Ok(Vec::new())), upload)
            .run_at(Some(march()), now())
            .await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::Upload));
        assert_eq!(outcome.rows_written, 0);
    }

    #[test]
    fn test_totals_sum_integer_measures() {
        let table = Transformer::new(&DAILY_TRAFFIC)
            .transform(&[
                record("2024-03-01", 10, 5, 1),
                record("2024-03-02", 20, 5, 2),
            ])
            .unwrap();

        let totals = totals(&table);
        assert_eq!(totals["requests"], 30);
        assert_eq!(totals["cached_requests"], 10);
        assert_eq!(totals["bytes"], 30 * 1024);
        assert_eq!(totals["threats"], 0);
        assert!(!totals.contains_key("date"));
    }

    fn config_with_oauth(path: &std::path::Path) -> FlaresheetConfig {
        let mut config = FlaresheetConfig::default();
        config.provider.api_token = "token".to_string();
        config.provider.zone_id = "0123456789abcdef0123456789abcdef".to_string();
        config.destination.spreadsheet_id = "spreadsheet".to_string();
        config.destination.oauth_client_config = path.display().to_string();
        config
    }

    fn http_client(config: &FlaresheetConfig) -> Client {
        crate::http_client::install_crypto_provider();
        build_client(&config.http).unwrap()
    }

    #[test]
    fn test_from_config_with_valid_oauth_client() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(
            &path,
            r#"{"type": "authorized_user", "client_id": "id.apps.googleusercontent.com",
                "client_secret": "secret", "refresh_token": "1//refresh"}"#,
        )
        .unwrap();

        let config = config_with_oauth(&path);
        assert!(PipelineRunner::from_config(&config, http_client(&config)).is_ok());
    }

    #[test]
    fn test_malformed_oauth_client_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(&path, "{not json").unwrap();

        let config = config_with_oauth(&path);
        let Err(error) = PipelineRunner::from_config(&config, http_client(&config)) else {
            panic!("malformed OAuth client accepted");
        };

        assert_eq!(error.kind(), ErrorKind::Config);
        assert_eq!(error.stage(), RunStage::Idle);
        assert!(matches!(
            error,
            PipelineError::Config(ConfigLoadError::OAuthClient(_))
        ));
    }

    #[test]
    fn test_unreadable_oauth_client_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_oauth(&dir.path().join("absent.json"));

        let Err(error) = PipelineRunner::from_config(&config, http_client(&config)) else {
            panic!("missing OAuth client accepted");
        };
        assert_eq!(error.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_missing_config_file_produces_config_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flaresheet.toml");

        let Err(error) = PipelineRunner::load(Some(&path)) else {
            panic!("missing config file accepted");
        };
        let outcome =
            PipelineRunner::setup_failure(None, now(), std::time::Duration::from_millis(3), &error);

        assert_eq!(outcome.status, RunStatus::Failure);
        assert_eq!(outcome.failed_stage, Some(RunStage::Idle));
        assert_eq!(outcome.error_kind, Some(ErrorKind::Config));
        assert_eq!(outcome.range, march());
        assert_eq!(outcome.duration_ms, 3);
        assert_eq!(outcome.rows_written, 0);
        assert_eq!(outcome.detail[0], "Configuration error");
        assert!(outcome.detail[1].contains("Config file not found"));

        let record = serde_json::to_value(&outcome).unwrap();
        assert_eq!(record["status"], "failure");
        assert_eq!(record["error_kind"], "config");
        assert_eq!(record["failed_stage"], "idle");
    }

    #[test]
    fn test_setup_failure_keeps_requested_range() {
        let error = PipelineError::from(ConfigLoadError::InvalidConfig("bad".to_string()));
        let range = TimeRange::single_day(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());

        let outcome =
            PipelineRunner::setup_failure(Some(range), now(), std::time::Duration::ZERO, &error);
        assert_eq!(outcome.range, range);
    }
}
