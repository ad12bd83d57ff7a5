use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use flaresheet_api::{
    CallError,
    MetricTable,
    RetryFailure,
    SinkError,
    TableSink,
    TimeRange,
    UploadError,
    UploadResult,
};
use secrecy::SecretString;
use tracing::{
    debug,
    info,
};

use crate::client::SheetsApi;
use crate::config::{
    UploaderSettings,
    DATE_PATTERN,
};
use crate::credentials::CredentialProvider;
use crate::mapper;
use crate::types::SheetRequest;

/// Loads metric tables into one tab of a Google spreadsheet
///
/// Every upload is a period-scoped upsert: rows of the uploaded period are
/// replaced, everything else on the tab is kept, and the tab is rewritten
/// from `A1` in a single call.
pub struct SheetsUploader {
    api: Arc<dyn SheetsApi>,
    credentials: Arc<CredentialProvider>,
    settings: UploaderSettings,
}

impl SheetsUploader {
    pub fn new<A: SheetsApi + 'static>(
        api: A, credentials: Arc<CredentialProvider>, settings: UploaderSettings,
    ) -> Self {
        Self::from_shared(Arc::new(api), credentials, settings)
    }

    pub fn from_shared(
        api: Arc<dyn SheetsApi>, credentials: Arc<CredentialProvider>, settings: UploaderSettings,
    ) -> Self {
        Self {
            api,
            credentials,
            settings,
        }
    }

    pub fn settings(&self) -> &UploaderSettings {
        &self.settings
    }

    async fn call<T, F, Fut>(&self, what: &str, operation: F) -> UploadResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        self.settings
            .retry_policy
            .retry(what, operation)
            .await
            .map_err(upload_error)
    }

    /// Returns the tab's sheet id, creating the tab when it does not exist
    async fn ensure_sheet(&self, token: &SecretString) -> UploadResult<Option<i64>> {
        let spreadsheet_id = self.settings.spreadsheet_id.as_str();
        let sheet_name = self.settings.sheet_name.as_str();

        let spreadsheet = self
            .call("read spreadsheet", || {
                self.api.get_spreadsheet(token, spreadsheet_id)
            })
            .await?;

        if let Some(sheet) = spreadsheet
            .sheets
            .iter()
            .find(|s| s.properties.title == sheet_name)
        {
            return Ok(Some(sheet.properties.sheet_id));
        }

        info!(sheet = sheet_name, "Creating missing sheet tab");
        let requests = [SheetRequest::add_sheet(sheet_name)];
        let response = self
            .call("add sheet", || {
                self.api.batch_update(token, spreadsheet_id, &requests)
            })
            .await?;
        Ok(response.added_sheet_id())
    }

    async fn write(
        &self, table: &MetricTable, range: &TimeRange, token: &SecretString,
    ) -> UploadResult<usize> {
        let spreadsheet_id = self.settings.spreadsheet_id.as_str();
        let sheet_name = self.settings.sheet_name.as_str();

        let sheet_id = self.ensure_sheet(token).await?;

        let whole_tab = mapper::quote_sheet_name(sheet_name);
        let existing = self
            .call("read sheet", || {
                self.api.get_values(token, spreadsheet_id, &whole_tab)
            })
            .await?
            .values;

        let plan = mapper::plan_merge(table, range, &existing, &self.settings);
        debug!(
            existing = existing.len(),
            kept = plan.kept,
            replaced = plan.replaced,
            preserved = plan.preserved,
            "Planned sheet merge"
        );

        let anchor = mapper::anchor_range(sheet_name, 1);
        self.call("write sheet", || {
            self.api
                .update_values(token, spreadsheet_id, &anchor, &plan.values)
        })
        .await?;

        if let Some((first, last)) = plan.stale_rows {
            let stale = mapper::rows_range(sheet_name, first, last);
            self.call("clear stale rows", || {
                self.api.clear_values(token, spreadsheet_id, &stale)
            })
            .await?;
        }

        if self.settings.format_dates {
            if let (Some(sheet_id), Some(column)) = (sheet_id, table.schema().date_index()) {
                let requests = [SheetRequest::date_format(
                    sheet_id,
                    column as u32,
                    DATE_PATTERN,
                )];
                self.call("format date column", || {
                    self.api.batch_update(token, spreadsheet_id, &requests)
                })
                .await?;
            }
        }

        info!(
            sheet = sheet_name,
            range = %range,
            rows = table.len(),
            kept = plan.kept,
            replaced = plan.replaced,
            "Uploaded table"
        );

        Ok(table.len())
    }
}

#[async_trait]
impl TableSink for SheetsUploader {
    fn name(&self) -> &'static str {
        "google-sheets"
    }

    async fn upload(&self, table: &MetricTable, range: &TimeRange) -> Result<usize, SinkError> {
        let credentials = self.credentials.get_credentials().await?;
        Ok(self
            .write(table, range, credentials.access_token())
            .await?)
    }
}

fn upload_error(failure: RetryFailure<CallError>) -> UploadError {
    if failure.exhausted {
        UploadError::RetriesExhausted {
            attempts: failure.attempts,
            last_status: failure.error.status(),
            cause: failure.error.to_string(),
        }
    } else {
        UploadError::Rejected {
            status: failure.error.status(),
            cause: failure.error.to_string(),
        }
    }
}
