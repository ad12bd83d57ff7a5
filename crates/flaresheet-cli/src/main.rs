mod cli;
mod schedule;

use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use chrono::{
    DateTime,
    Utc,
};
use clap::Parser;
use flaresheet_api::{
    ErrorKind,
    RunOutcome,
    TimeRange,
};
use flaresheet_core::{
    build_client,
    install_crypto_provider,
    logging,
    ConfigLoadError,
    ConfigLoader,
    PipelineError,
    PipelineRunner,
};

use crate::cli::{
    Cli,
    Commands,
    RunArgs,
};

const EXIT_SUCCESS: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    install_crypto_provider();

    if cli.verbose {
        logging::init_dev();
    } else {
        logging::init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        None => run(config_path, RunArgs::default()).await,
        Some(Commands::Run(args)) => run(config_path, args).await,
        Some(Commands::Daemon) => daemon(config_path).await,
        Some(Commands::CheckConfig) => check_config(config_path),
    }
}

fn exit_status(outcome: &RunOutcome) -> u8 {
    match outcome.error_kind {
        None => EXIT_SUCCESS,
        Some(ErrorKind::Config) => EXIT_CONFIG,
        Some(_) => EXIT_FAILURE,
    }
}

fn requested_range(args: &RunArgs) -> Result<Option<TimeRange>, PipelineError> {
    match (args.start, args.end) {
        (Some(start), Some(end)) => TimeRange::new(start, end)
            .map(Some)
            .map_err(|e| ConfigLoadError::InvalidConfig(format!("Invalid range: {e}")).into()),
        _ => Ok(None),
    }
}

/// Logs the outcome record for an invocation that never got to run
fn setup_failed(
    range: Option<TimeRange>, started_at: DateTime<Utc>, started: Instant, error: &PipelineError,
) -> ExitCode {
    let outcome = PipelineRunner::setup_failure(range, started_at, started.elapsed(), error);
    ExitCode::from(exit_status(&outcome))
}

async fn run(config_path: Option<&Path>, args: RunArgs) -> ExitCode {
    let started_at = Utc::now();
    let started = Instant::now();

    let range = match requested_range(&args) {
        Ok(range) => range,
        Err(e) => return setup_failed(None, started_at, started, &e),
    };

    let runner = match PipelineRunner::load(config_path) {
        Ok(runner) => runner,
        Err(e) => return setup_failed(range, started_at, started, &e),
    };

    let outcome = runner.run(range).await;
    ExitCode::from(exit_status(&outcome))
}

async fn daemon(config_path: Option<&Path>) -> ExitCode {
    let started_at = Utc::now();
    let started = Instant::now();

    let runner = match PipelineRunner::load(config_path) {
        Ok(runner) => runner,
        Err(e) => return setup_failed(None, started_at, started, &e),
    };

    tracing::info!("Starting monthly scheduler");

    loop {
        runner.run(None).await;

        let Some(next) = schedule::next_monthly_run(Utc::now()) else {
            tracing::error!("Could not compute the next run time");
            return ExitCode::from(EXIT_FAILURE);
        };
        tracing::info!(next_run = %next, "Waiting for next run");

        while Utc::now() < next {
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down scheduler");
                    return ExitCode::SUCCESS;
                }
            }
        }
    }
}

fn check_config(config_path: Option<&Path>) -> ExitCode {
    match validate(config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Configuration error");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn validate(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => ConfigLoader::load(Some(path)),
        None => ConfigLoader::load_default(),
    }
    .context("Failed to load configuration")?;

    let client = build_client(&config.http).context("Failed to build HTTP client")?;
    PipelineRunner::from_config(&config, client).context("Failed to initialise pipeline")?;

    tracing::info!(
        zone = %config.provider.zone_id,
        spreadsheet = %config.destination.spreadsheet_id,
        sheet = %config.destination.sheet_name,
        "Configuration is valid"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use chrono::{
        NaiveDate,
        TimeZone,
    };
    use flaresheet_api::{
        RunStage,
        UploadError,
    };

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 0, 5, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_exit_status_per_outcome() {
        let range = TimeRange::previous_month(now());

        let success = RunOutcome::success(range, now(), Duration::ZERO, 31, BTreeMap::new());
        assert_eq!(exit_status(&success), EXIT_SUCCESS);

        let upload = flaresheet_api::SinkError::from(UploadError::Rejected {
            status: Some(403),
            cause: "forbidden".to_string(),
        });
        let failed = RunOutcome::failure(
            range,
            now(),
            Duration::ZERO,
            RunStage::Uploading,
            ErrorKind::Upload,
            &upload,
        );
        assert_eq!(exit_status(&failed), EXIT_FAILURE);

        let config = PipelineError::from(ConfigLoadError::InvalidConfig("bad".to_string()));
        let misconfigured =
            PipelineRunner::setup_failure(None, now(), Duration::ZERO, &config);
        assert_eq!(exit_status(&misconfigured), EXIT_CONFIG);
    }

    #[test]
    fn test_requested_range() {
        assert_eq!(requested_range(&RunArgs::default()).unwrap(), None);

        let args = RunArgs {
            start: Some(day(1)),
            end: Some(day(31)),
        };
        let range = requested_range(&args).unwrap().unwrap();
        assert_eq!((range.start(), range.end()), (day(1), day(31)));
    }

    #[test]
    fn test_inverted_range_is_a_config_failure() {
        let args = RunArgs {
            start: Some(day(31)),
            end: Some(day(1)),
        };
        let Err(error) = requested_range(&args) else {
            panic!("inverted range accepted");
        };
        assert_eq!(error.kind(), ErrorKind::Config);

        let outcome = PipelineRunner::setup_failure(None, now(), Duration::ZERO, &error);
        assert_eq!(outcome.failed_stage, Some(RunStage::Idle));
        assert!(outcome.detail[1].contains("Invalid range"));
        assert_eq!(exit_status(&outcome), EXIT_CONFIG);
    }

    #[test]
    fn test_missing_config_file_exits_with_config_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flaresheet.toml");

        let Err(error) = PipelineRunner::load(Some(&path)) else {
            panic!("missing config file accepted");
        };
        let outcome = PipelineRunner::setup_failure(None, now(), Duration::ZERO, &error);

        assert_eq!(outcome.error_kind, Some(ErrorKind::Config));
        assert_eq!(outcome.range, TimeRange::previous_month(now()));
        assert_eq!(exit_status(&outcome), EXIT_CONFIG);
    }
}
