//! Omni Source - turn a single piece of online media into a transcript plus a manifest
//!
//! This library classifies an input (URL or search topic), normalizes platform links,
//! and walks an ordered cascade of acquisition strategies: readable-HTML proxy, platform
//! metadata APIs, subtitle extraction, audio download and local speech-to-text. Every
//! stage reports into a [`Manifest`] instead of aborting the run.

pub mod audio;
pub mod cli;
pub mod config;
pub mod context;
pub mod downloader;
pub mod fallback;
pub mod fetch;
pub mod manifest;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod platforms;
pub mod process;
pub mod source;
pub mod subtitles;
pub mod transcribe;
pub mod transcript;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use manifest::Manifest;
pub use pipeline::{AcquisitionPipeline, RunSummary};
pub use platforms::{PlatformRegistry, PlatformStrategy};
pub use source::{Platform, Source, SourceKind};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Failure taxonomy shared by every acquisition stage
#[derive(thiserror::Error, Debug)]
pub enum AcquireError {
    #[error("Cannot classify input: {0}")]
    Classification(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Redirect limit of {limit} exceeded for {url}")]
    RedirectLoop { url: String, limit: usize },

    #[error("{0} is not installed")]
    ToolMissing(String),

    #[error("{tool} failed: {detail}")]
    ToolFailure { tool: String, detail: String },

    #[error("{0} produced no usable output")]
    EmptyResult(String),

    #[error("Output directory {path} is not usable: {source}")]
    OutputDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<fetch::FetchError> for AcquireError {
    fn from(err: fetch::FetchError) -> Self {
        match err {
            fetch::FetchError::TooManyRedirects { url, limit } => {
                AcquireError::RedirectLoop { url, limit }
            }
            other => AcquireError::Network(other.to_string()),
        }
    }
}

impl From<process::ToolError> for AcquireError {
    fn from(err: process::ToolError) -> Self {
        match err {
            process::ToolError::Missing { tool } => AcquireError::ToolMissing(tool),
            other => AcquireError::ToolFailure {
                tool: other.tool().to_string(),
                detail: other.to_string(),
            },
        }
    }
}
