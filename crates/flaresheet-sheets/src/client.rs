//! HTTP transport for the Google Sheets API v4

use async_trait::async_trait;
use flaresheet_api::CallError;
use reqwest::{
    Client,
    RequestBuilder,
};
use secrecy::{
    ExposeSecret,
    SecretString,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::types::{
    BatchUpdateResponse,
    SheetRequest,
    Spreadsheet,
    UpdateValuesResponse,
    ValueRange,
};

pub const DEFAULT_SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Single Sheets API calls, without retries
///
/// Every call carries the access token it should authenticate with, so the
/// caller decides when credentials are obtained.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Reads a range with formulas left unevaluated
    async fn get_values(
        &self, token: &SecretString, spreadsheet_id: &str, range: &str,
    ) -> Result<ValueRange, CallError>;

    /// Overwrites a range, parsing values as if typed by a user
    async fn update_values(
        &self, token: &SecretString, spreadsheet_id: &str, range: &str, values: &[Vec<Value>],
    ) -> Result<UpdateValuesResponse, CallError>;

    async fn clear_values(
        &self, token: &SecretString, spreadsheet_id: &str, range: &str,
    ) -> Result<(), CallError>;

    async fn get_spreadsheet(
        &self, token: &SecretString, spreadsheet_id: &str,
    ) -> Result<Spreadsheet, CallError>;

    async fn batch_update(
        &self, token: &SecretString, spreadsheet_id: &str, requests: &[SheetRequest],
    ) -> Result<BatchUpdateResponse, CallError>;
}

pub struct SheetsClient {
    client: Client,
    base_url: String,
}

impl SheetsClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_SHEETS_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str, suffix: &str) -> String {
        values_url(&self.base_url, spreadsheet_id, range, suffix)
    }

    async fn send<T: DeserializeOwned>(
        &self, request: RequestBuilder, token: &SecretString,
    ) -> Result<T, CallError> {
        let response = request.bearer_auth(token.expose_secret()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CallError::from_status(status.as_u16(), &text));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::from_str("{}")?);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn values_url(base_url: &str, spreadsheet_id: &str, range: &str, suffix: &str) -> String {
    format!(
        "{base_url}/{}/values/{}{suffix}",
        urlencoding::encode(spreadsheet_id),
        urlencoding::encode(range)
    )
}

#[async_trait]
impl SheetsApi for SheetsClient {
    async fn get_values(
        &self, token: &SecretString, spreadsheet_id: &str, range: &str,
    ) -> Result<ValueRange, CallError> {
        debug!(range, "Reading sheet values");
        let url = self.values_url(spreadsheet_id, range, "?valueRenderOption=FORMULA");
        self.send(self.client.get(&url), token).await
    }

    async fn update_values(
        &self, token: &SecretString, spreadsheet_id: &str, range: &str, values: &[Vec<Value>],
    ) -> Result<UpdateValuesResponse, CallError> {
        debug!(range, rows = values.len(), "Writing sheet values");
        let url = self.values_url(spreadsheet_id, range, "?valueInputOption=USER_ENTERED");
        let body = serde_json::json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": values,
        });
        self.send(self.client.put(&url).json(&body), token).await
    }

    async fn clear_values(
        &self, token: &SecretString, spreadsheet_id: &str, range: &str,
    ) -> Result<(), CallError> {
        debug!(range, "Clearing sheet values");
        let url = self.values_url(spreadsheet_id, range, ":clear");
        let _: Value = self
            .send(self.client.post(&url).json(&serde_json::json!({})), token)
            .await?;
        Ok(())
    }

    async fn get_spreadsheet(
        &self, token: &SecretString, spreadsheet_id: &str,
    ) -> Result<Spreadsheet, CallError> {
        let url = format!(
            "{}/{}?fields={}",
            self.base_url,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode("sheets.properties(sheetId,title)")
        );
        self.send(self.client.get(&url), token).await
    }

    async fn batch_update(
        &self, token: &SecretString, spreadsheet_id: &str, requests: &[SheetRequest],
    ) -> Result<BatchUpdateResponse, CallError> {
        debug!(requests = requests.len(), "Sending batch update");
        let url = format!(
            "{}/{}:batchUpdate",
            self.base_url,
            urlencoding::encode(spreadsheet_id)
        );
        let body = serde_json::json!({ "requests": requests });
        self.send(self.client.post(&url).json(&body), token).await
    }
}
