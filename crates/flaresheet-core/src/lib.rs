//! Configuration, transformation and run orchestration for flaresheet
//!
//! The binary loads a [`config::FlaresheetConfig`], builds a shared HTTP
//! client with [`http_client::build_client`] and hands both to
//! [`runner::PipelineRunner::from_config`]. Each call to
//! [`runner::PipelineRunner::run`] performs one fetch, transform and
//! upload cycle and reports it as a single
//! [`flaresheet_api::RunOutcome`].

pub mod config;
pub mod http_client;
pub mod logging;
pub mod runner;
pub mod transform;

pub use config::{
    ConfigLoadError,
    ConfigLoader,
    FlaresheetConfig,
};
pub use http_client::{
    build_client,
    install_crypto_provider,
    HttpClientError,
};
pub use runner::{
    PipelineError,
    PipelineRunner,
};
pub use transform::Transformer;
