//! Google Sheets destination for flaresheet
//!
//! [`SheetsUploader`] implements [`flaresheet_api::TableSink`] on top of the
//! Sheets API v4, authenticating through [`CredentialProvider`].
//!
//! Uploads are period-scoped upserts, so a failed or repeated run for the
//! same period is repaired simply by running it again.

pub mod client;
pub mod config;
pub mod credentials;
pub mod mapper;
pub mod types;
pub mod uploader;

pub use client::{
    SheetsApi,
    SheetsClient,
    DEFAULT_SHEETS_URL,
};
pub use config::{
    BytesFormat,
    UploaderSettings,
    DEFAULT_SHEET_NAME,
};
pub use credentials::{
    CredentialProvider,
    Credentials,
    HttpTokenEndpoint,
    OAuthClient,
    TokenEndpoint,
    TokenResponse,
    SPREADSHEETS_SCOPE,
};
pub use mapper::format_bytes;
pub use uploader::SheetsUploader;
