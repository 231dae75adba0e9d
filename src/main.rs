use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, InquireError, Text};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubeflac::cli::{Cli, Commands};
use tubeflac::config::Config;
use tubeflac::extractors::ytdlp::YtDlpExtractor;
use tubeflac::extractors::AudioExtractor;
use tubeflac::runner::{JobRunner, RunnerSettings};
use tubeflac::{output, server, utils};

/// How often the CLI polls the job status
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "tubeflac=debug" } else { "tubeflac=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(cli.log_json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!cli.log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    let mut config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Download {
            url,
            yes,
            output_dir,
            format,
            cookies,
            fallback_cookies,
        } => {
            if let Some(dir) = output_dir {
                config.download.output_dir = dir;
            }
            if let Some(format) = format {
                config.download.audio_format = format;
            }
            if let Some(source) = cookies {
                config.credentials.primary = source;
            }
            if let Some(source) = fallback_cookies {
                config.credentials.fallback = Some(source);
            }

            let url = match url {
                Some(url) => url,
                None => match prompt_for_url()? {
                    Some(url) => url,
                    None => {
                        println!("Nothing to download.");
                        return Ok(());
                    }
                },
            };

            // Unsupported URLs are left to the runner to reject
            let confirm = !yes
                && utils::is_playlist_url(&url)
                && utils::is_supported_url(&url, &config.sites.hosts);
            if confirm && !confirm_playlist()? {
                println!("Cancelled.");
                return Ok(());
            }

            let runner = build_runner(&config).await?;
            run_download(&runner, &url, cli.quiet).await?;
        }
        Commands::Serve { host, port, no_open } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

            let runner = build_runner(&config).await?;
            println!("Saving audio to: {}", config.download.output_dir.display());
            println!("Open http://{} in your browser (Ctrl+C to stop)", addr);
            server::serve(runner, addr, config.server.open_browser && !no_open).await?;
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Edit the config file to change settings:");
                println!("  {}", Config::config_path(cli.config.as_deref())?.display());
            }
        }
        Commands::Sites => {
            println!("Supported sites:");
            for host in &config.sites.hosts {
                println!("  • {}", host);
            }
        }
    }

    Ok(())
}

/// Ask for the URL on the terminal; `None` when the user enters nothing or cancels
fn prompt_for_url() -> Result<Option<String>> {
    let answer = Text::new("Video URL:")
        .with_help_message("Leave empty to quit")
        .prompt();

    match answer {
        Ok(url) if url.trim().is_empty() => Ok(None),
        Ok(url) => Ok(Some(url.trim().to_string())),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
        Err(err) => Err(err).context("Failed to read the URL, pass it as an argument instead"),
    }
}

/// Playlist URLs only ever fetch the addressed video; make sure that is what the user wants
fn confirm_playlist() -> Result<bool> {
    let answer = Confirm::new("Playlist URL detected, only the first video is downloaded. Continue?")
        .with_default(false)
        .prompt();

    match answer {
        Ok(answer) => Ok(answer),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(false),
        Err(err) => Err(err).context("Failed to read confirmation, use --yes to skip it"),
    }
}

/// Check external tools, prepare the output directory and wire the runner
async fn build_runner(config: &Config) -> Result<JobRunner> {
    let extractor = YtDlpExtractor::new(config.tools.yt_dlp_path.clone())
        .with_ffmpeg_location(config.tools.ffmpeg_location.clone());

    // Missing tools are reported but not fatal; they may be found at run time
    let mut missing_deps = Vec::new();
    if !extractor.check_availability().await {
        missing_deps.push(format!(
            "{} ({}) - required for audio extraction",
            config.tools.yt_dlp_path,
            extractor.platform_name()
        ));
    }
    missing_deps.extend(utils::check_dependencies(config.tools.ffmpeg_location.as_deref()).await);
    if !missing_deps.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }

    config.prepare_output_dir()?;

    Ok(JobRunner::new(Arc::new(extractor), RunnerSettings::from_config(config)))
}

/// Submit one job and follow it until it finishes
async fn run_download(runner: &JobRunner, url: &str, quiet: bool) -> Result<()> {
    let ticket = runner.submit(url)?;
    tracing::debug!(job_id = %ticket.job_id, "Following job");

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("Invalid progress template")?,
        );
        progress.enable_steady_tick(Duration::from_millis(120));
        progress
    };

    let mut printed = 0;
    loop {
        let status = runner.poll();

        for entry in status.log.iter().skip(printed) {
            let line = output::format_log_entry(entry);
            if quiet {
                continue;
            } else if progress.is_hidden() {
                println!("{}", line);
            } else {
                progress.println(line);
            }
        }
        printed = printed.max(status.log.len());
        progress.set_message(status.message.clone());

        if status.state.is_terminal() {
            progress.finish_and_clear();
            ticket.finished().await;
            return output::report_outcome(&status);
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
