use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CONFIG_ENV;
use crate::extractors::{AudioFormat, CredentialSource};

#[derive(Parser)]
#[command(
    name = "tubeflac",
    about = "tubeflac - Download audio from YouTube as lossless FLAC",
    version,
    long_about = "Fetches the audio of a single YouTube video with yt-dlp and converts it to a lossless format with ffmpeg. Use it from the command line or through a small local web page."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./tubeflac.yaml or the user config directory)
    #[arg(short, long, global = true, env = CONFIG_ENV, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download the audio of one video and convert it
    Download {
        /// Video URL (prompted for when omitted; playlist parameters are dropped, only the addressed video is fetched)
        #[arg(value_name = "URL")]
        url: Option<String>,

        /// Download playlist URLs without asking for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Directory for the converted file
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<AudioFormat>,

        /// Browser to read cookies from on the first attempt
        #[arg(long, value_enum, value_name = "BROWSER")]
        cookies: Option<CredentialSource>,

        /// Browser tried once if the first one is rejected
        #[arg(long, value_enum, value_name = "BROWSER")]
        fallback_cookies: Option<CredentialSource>,
    },

    /// Serve the local web page
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open the page in a browser
        #[arg(long)]
        no_open: bool,
    },

    /// Show or edit configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List supported sites
    Sites,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download_with_overrides() {
        let cli = Cli::try_parse_from([
            "tubeflac",
            "download",
            "https://youtu.be/abc",
            "--format",
            "wav",
            "--cookies",
            "firefox",
            "--fallback-cookies",
            "none",
        ])
        .unwrap();

        match cli.command {
            Commands::Download {
                url,
                yes,
                format,
                cookies,
                fallback_cookies,
                output_dir,
            } => {
                assert_eq!(url.as_deref(), Some("https://youtu.be/abc"));
                assert!(!yes);
                assert_eq!(format, Some(AudioFormat::Wav));
                assert_eq!(cookies, Some(CredentialSource::Firefox));
                assert_eq!(fallback_cookies, Some(CredentialSource::None));
                assert!(output_dir.is_none());
            }
            _ => panic!("expected download command"),
        }
    }

    #[test]
    fn test_parse_download_without_url() {
        let cli = Cli::try_parse_from(["tubeflac", "download", "--yes"]).unwrap();
        assert!(matches!(cli.command, Commands::Download { url: None, yes: true, .. }));
    }

    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::try_parse_from(["tubeflac", "serve"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Serve {
                host: None,
                port: None,
                no_open: false
            }
        ));

        let cli = Cli::try_parse_from(["tubeflac", "serve", "--no-open"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { no_open: true, .. }));
    }
}
