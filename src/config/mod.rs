use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::extractors::{AudioFormat, CredentialSource};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "TUBEFLAC_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Output settings
    pub download: DownloadConfig,

    /// Cookie sources handed to the extractor
    pub credentials: CredentialConfig,

    /// External tool locations
    pub tools: ToolsConfig,

    /// Accepted sites
    pub sites: SitesConfig,

    /// Local web surface
    pub server: ServerConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory converted audio is written to
    pub output_dir: PathBuf,

    /// Lossless output format
    pub audio_format: AudioFormat,

    /// Transcoder quality, 0 (best) to 10
    pub audio_quality: String,

    /// Download only the addressed item, never a whole playlist
    pub single_item: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Source used for the first attempt
    pub primary: CredentialSource,

    /// Source tried once if the primary one is rejected
    pub fallback: Option<CredentialSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub yt_dlp_path: String,

    /// ffmpeg binary or the directory containing it; PATH lookup when unset
    pub ffmpeg_location: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitesConfig {
    /// Host substrings a URL must contain
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Open the page in the default browser once the server is listening
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

fn default_open_browser() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Download progress is logged every this many percent
    pub progress_log_step: f64,

    /// Longest raw error text kept in status messages
    pub max_error_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download: DownloadConfig {
                output_dir: default_output_dir(),
                audio_format: AudioFormat::Flac,
                audio_quality: "0".to_string(),
                single_item: true,
            },
            credentials: CredentialConfig {
                primary: CredentialSource::Chrome,
                fallback: Some(CredentialSource::Safari),
            },
            tools: ToolsConfig {
                yt_dlp_path: "yt-dlp".to_string(),
                ffmpeg_location: None,
            },
            sites: SitesConfig {
                hosts: vec!["youtube.com".to_string(), "youtu.be".to_string()],
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
                open_browser: true,
            },
            app: AppConfig {
                progress_log_step: 10.0,
                max_error_chars: 200,
            },
        }
    }
}

/// `<Downloads>/YouTube_Audio`, falling back to the home directory and then the working directory
fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("YouTube_Audio")
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = Self::config_path(explicit)?;
        Self::load_from(&config_path)
    }

    /// Load from `config_path`, writing the defaults there when it does not exist yet
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs_err::read_to_string(config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            tracing::debug!(path = %config_path.display(), "Loaded configuration");
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(config_path)?;
            tracing::info!(path = %config_path.display(), "Wrote default configuration");
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        // Current directory first for easy testing
        let local_config = PathBuf::from("tubeflac.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("tubeflac").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.download.output_dir.as_os_str().is_empty() {
            anyhow::bail!("download.output_dir must be set");
        }

        match self.download.audio_quality.parse::<u8>() {
            Ok(quality) if quality <= 10 => {}
            _ => anyhow::bail!(
                "download.audio_quality must be between 0 and 10, got {:?}",
                self.download.audio_quality
            ),
        }

        if self.sites.hosts.iter().all(|host| host.trim().is_empty()) {
            anyhow::bail!("sites.hosts must list at least one host");
        }

        if self.tools.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("tools.yt_dlp_path must be set");
        }

        if !(self.app.progress_log_step > 0.0 && self.app.progress_log_step <= 100.0) {
            anyhow::bail!("app.progress_log_step must be in (0, 100]");
        }

        if self.app.max_error_chars < 20 {
            anyhow::bail!("app.max_error_chars must be at least 20");
        }

        if self.credentials.fallback == Some(self.credentials.primary) {
            tracing::warn!(
                source = %self.credentials.primary,
                "Fallback credential source equals the primary one; no fallback attempt will be made"
            );
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Output Directory: {}", self.download.output_dir.display());
        println!("  Audio Format: {} (quality {})", self.download.audio_format, self.download.audio_quality);
        println!("  Single Item Only: {}", self.download.single_item);
        println!("  Credential Source: {}", self.credentials.primary);
        match self.credentials.fallback {
            Some(fallback) => println!("  Fallback Credential Source: {}", fallback),
            None => println!("  Fallback Credential Source: (none)"),
        }
        println!("  yt-dlp: {}", self.tools.yt_dlp_path);
        if let Some(ffmpeg) = &self.tools.ffmpeg_location {
            println!("  ffmpeg: {}", ffmpeg.display());
        }
        println!("  Supported Hosts: {}", self.sites.hosts.join(", "));
        println!("  Web Server: http://{}:{}", self.server.host, self.server.port);
        println!("  Open Browser On Start: {}", self.server.open_browser);
    }

    /// Ensure the output directory exists
    pub fn prepare_output_dir(&self) -> Result<()> {
        fs_err::create_dir_all(&self.download.output_dir)
            .context("Failed to create output directory")?;
        Ok(())
    }
}
