use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

pub mod ytdlp;

use crate::Result;

/// Lossless audio targets the transcoder can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Flac,
    Wav,
    Alac,
}

impl AudioFormat {
    /// Codec name understood by `yt-dlp --audio-format`
    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Alac => "alac",
        }
    }

    /// File extension of the converted output
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Alac => "m4a",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.codec())
    }
}

/// Where the extractor reads site-login cookies from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// Anonymous access, no cookies
    None,
    Chrome,
    Safari,
    Firefox,
    Edge,
    Brave,
    Chromium,
    Opera,
    Vivaldi,
}

impl CredentialSource {
    /// Browser name for `--cookies-from-browser`, `None` for anonymous access
    pub fn browser(&self) -> Option<&'static str> {
        match self {
            CredentialSource::None => None,
            CredentialSource::Chrome => Some("chrome"),
            CredentialSource::Safari => Some("safari"),
            CredentialSource::Firefox => Some("firefox"),
            CredentialSource::Edge => Some("edge"),
            CredentialSource::Brave => Some("brave"),
            CredentialSource::Chromium => Some("chromium"),
            CredentialSource::Opera => Some("opera"),
            CredentialSource::Vivaldi => Some("vivaldi"),
        }
    }
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.browser().unwrap_or("none"))
    }
}

/// Everything the extractor needs for one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractRequest {
    /// Normalized single-item URL
    pub url: String,

    /// Directory the converted file is written to
    pub output_dir: PathBuf,

    pub audio_format: AudioFormat,

    /// Transcoder quality setting, `0` is best
    pub audio_quality: String,

    /// Never expand playlists
    pub single_item: bool,

    pub credential_source: CredentialSource,
}

/// Incremental progress reported by the extractor
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Media is being fetched
    Downloading {
        percent: Option<f64>,
        speed: Option<String>,
    },
    /// Download done, transcoding starts
    Finished,
}

/// Callback invoked from inside the extractor for every progress event
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// What a successful extraction produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOutput {
    pub title: String,
    pub output_path: PathBuf,
}

/// Trait for the external extraction + transcode dependency
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Fetch and convert the audio described by `request`, reporting progress as it goes.
    ///
    /// Failures carry the dependency's raw message; the runner classifies them.
    async fn extract(&self, request: &ExtractRequest, progress: ProgressCallback) -> Result<ExtractOutput>;

    /// Check if the underlying tool can be invoked
    async fn check_availability(&self) -> bool;

    /// Get the name of this extractor
    fn platform_name(&self) -> &'static str;
}
