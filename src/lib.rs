//! tubeflac - fetch the audio of a single video and convert it to a lossless format
//!
//! The crate drives `yt-dlp` (and through it `ffmpeg`) from a single-slot job runner
//! that tracks a status record, exposed through a CLI and a small local web page.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod runner;
pub mod server;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use extractors::{AudioExtractor, AudioFormat, CredentialSource, ExtractOutput, ExtractRequest, ProgressEvent};
pub use runner::{JobRunner, JobState, JobStatus, JobTicket, RunnerSettings};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Failure taxonomy of a download job
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Unsupported URL: {0}")]
    InvalidInput(String),

    #[error("Rate limited by the site, retry in about an hour")]
    RateLimited,

    #[error("Content is unavailable (removed, private or region restricted)")]
    ResourceUnavailable,

    #[error("Access denied or credential source unusable: {0}")]
    CredentialSourceFailure(String),

    #[error("Download failed: {0}")]
    Unclassified(String),
}

impl JobError {
    /// Whether this failure warrants one retry with the alternate credential source
    pub fn allows_credential_fallback(&self) -> bool {
        matches!(self, JobError::CredentialSourceFailure(_))
    }
}
