use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use super::{AudioExtractor, ExtractOutput, ExtractRequest, ProgressCallback, ProgressEvent};
use crate::utils::{output_path_for, sanitize_filename};
use crate::Result;

/// Prefix our progress template puts in front of every progress line
const PROGRESS_MARKER: &str = "tubeflac-progress";

/// Number of trailing stderr lines kept when yt-dlp fails without an `ERROR:` line
const STDERR_TAIL_LINES: usize = 5;

/// Audio extractor driving the `yt-dlp` binary (which in turn drives `ffmpeg`)
pub struct YtDlpExtractor {
    yt_dlp_path: String,
    ffmpeg_location: Option<PathBuf>,
}

impl YtDlpExtractor {
    pub fn new(yt_dlp_path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            ffmpeg_location: None,
        }
    }

    /// Point yt-dlp at a specific ffmpeg binary or directory
    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    fn selection_args(request: &ExtractRequest) -> Vec<String> {
        let mut args = Vec::new();

        if request.single_item {
            args.push("--no-playlist".to_string());
        }

        if let Some(browser) = request.credential_source.browser() {
            args.push("--cookies-from-browser".to_string());
            args.push(browser.to_string());
        }

        args
    }

    /// Get video information using yt-dlp
    async fn get_video_info(&self, request: &ExtractRequest) -> Result<Value> {
        tracing::debug!(url = %request.url, cookies = %request.credential_source, "Extracting video info");

        let output = Command::new(&self.yt_dlp_path)
            .arg("--dump-json")
            .args(Self::selection_args(request))
            .arg(&request.url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.yt_dlp_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", summarize_stderr(&stderr));
        }

        let json_str = String::from_utf8(output.stdout)?;
        let info: Value = serde_json::from_str(json_str.trim())
            .context("yt-dlp returned malformed video info")?;

        Ok(info)
    }

    /// Build the argument list for the download + conversion run
    fn download_args(&self, request: &ExtractRequest, file_stem: &str) -> Vec<String> {
        // A literal `%` in the title must not start an output template field
        let template = request
            .output_dir
            .join(format!("{}.%(ext)s", file_stem.replace('%', "%%")));

        let mut args = vec![
            "--format".to_string(),
            "bestaudio/best".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            request.audio_format.codec().to_string(),
            "--audio-quality".to_string(),
            request.audio_quality.clone(),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{} %(progress.status)s %(progress._percent_str)s %(progress._speed_str)s",
                PROGRESS_MARKER
            ),
        ];

        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string_lossy().into_owned());
        }

        args.extend(Self::selection_args(request));
        args.push(request.url.clone());
        args
    }

    async fn run_download(&self, args: &[String], progress: &ProgressCallback) -> Result<()> {
        let mut child = Command::new(&self.yt_dlp_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.yt_dlp_path))?;

        let stdout = child.stdout.take().context("yt-dlp stdout was not captured")?;
        let stderr = child.stderr.take().context("yt-dlp stderr was not captured")?;

        // Progress may land on either stream depending on yt-dlp's quiet settings
        let (_, stderr_lines, status) = tokio::join!(
            forward_progress(stdout, progress.clone()),
            forward_progress(stderr, progress.clone()),
            child.wait()
        );
        let status = status?;

        if !status.success() {
            let stderr = stderr_lines?.join("\n");
            anyhow::bail!("yt-dlp exited with {}: {}", status, summarize_stderr(&stderr));
        }

        Ok(())
    }
}

#[async_trait]
impl AudioExtractor for YtDlpExtractor {
    async fn extract(&self, request: &ExtractRequest, progress: ProgressCallback) -> Result<ExtractOutput> {
        let info = self.get_video_info(request).await?;
        let title = info["title"].as_str().unwrap_or("Unknown").to_string();
        tracing::info!(%title, "Resolved video title");

        let file_stem = sanitize_filename(&title);
        let args = self.download_args(request, &file_stem);
        tracing::debug!(?args, "Running yt-dlp");

        self.run_download(&args, &progress).await?;

        let output_path = output_path_for(&request.output_dir, &title, request.audio_format);
        if !output_path.exists() {
            tracing::warn!(path = %output_path.display(), "yt-dlp reported success but the output file is missing");
        }

        Ok(ExtractOutput { title, output_path })
    }

    async fn check_availability(&self) -> bool {
        Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn platform_name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Read `stream` line by line, forwarding progress lines and returning the rest
async fn forward_progress<R>(stream: R, progress: ProgressCallback) -> std::io::Result<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    let mut other = Vec::new();

    while let Some(line) = lines.next_line().await? {
        match parse_progress_line(&line) {
            Some(event) => progress(event),
            None => {
                tracing::trace!(line = %line, "yt-dlp");
                other.push(line);
            }
        }
    }

    Ok(other)
}

/// Parse one line produced by our `--progress-template`
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let plain = console::strip_ansi_codes(line);
    let rest = plain.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut tokens = rest.split_whitespace();

    match tokens.next()? {
        "downloading" => {
            let percent = tokens
                .next()
                .and_then(|token| token.trim_end_matches('%').parse::<f64>().ok());
            let speed = tokens.collect::<Vec<_>>().join(" ");
            let speed = match speed.as_str() {
                "" | "NA" | "N/A" | "Unknown B/s" | "Unknown" => None,
                _ => Some(speed),
            };

            Some(ProgressEvent::Downloading { percent, speed })
        }
        "finished" => Some(ProgressEvent::Finished),
        _ => None,
    }
}

/// Pick the useful part of yt-dlp's stderr for an error message
fn summarize_stderr(stderr: &str) -> String {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ERROR:"))
        .collect();

    if !errors.is_empty() {
        return errors.join(" | ");
    }

    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|line| !line.is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);

    if lines.is_empty() {
        "no error output".to_string()
    } else {
        lines[start..].join(" | ")
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{AudioFormat, CredentialSource};

    fn request(credential_source: CredentialSource) -> ExtractRequest {
        ExtractRequest {
            url: "https://www.youtube.com/watch?v=abc".to_string(),
            output_dir: PathBuf::from("/music"),
            audio_format: AudioFormat::Flac,
            audio_quality: "0".to_string(),
            single_item: true,
            credential_source,
        }
    }

    #[test]
    fn test_parse_downloading_line() {
        let event = parse_progress_line("tubeflac-progress downloading  45.3%   1.20MiB/s");
        assert_eq!(
            event,
            Some(ProgressEvent::Downloading {
                percent: Some(45.3),
                speed: Some("1.20MiB/s".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_line_with_ansi_and_unknown_speed() {
        let line = "tubeflac-progress downloading \u{1b}[0;94m  0.0%\u{1b}[0m Unknown B/s";
        assert_eq!(
            parse_progress_line(line),
            Some(ProgressEvent::Downloading { percent: Some(0.0), speed: None })
        );
    }

    #[test]
    fn test_parse_finished_line() {
        assert_eq!(
            parse_progress_line("tubeflac-progress finished 100.0% 2.00MiB/s"),
            Some(ProgressEvent::Finished)
        );
    }

    #[test]
    fn test_parse_ignores_other_output() {
        assert_eq!(parse_progress_line("[youtube] abc: Downloading webpage"), None);
        assert_eq!(parse_progress_line("[ExtractAudio] Destination: /music/x.flac"), None);
        assert_eq!(parse_progress_line("tubeflac-progress error"), None);
        assert_eq!(parse_progress_line(""), None);
    }

    #[test]
    fn test_summarize_stderr_prefers_error_lines() {
        let stderr = "WARNING: something\nERROR: [youtube] abc: Video unavailable\n";
        assert_eq!(summarize_stderr(stderr), "ERROR: [youtube] abc: Video unavailable");
    }

    #[test]
    fn test_summarize_stderr_falls_back_to_tail() {
        let stderr = (1..=8).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        assert_eq!(summarize_stderr(&stderr), "line 4 | line 5 | line 6 | line 7 | line 8");
        assert_eq!(summarize_stderr(""), "no error output");
    }

    #[test]
    fn test_download_args_with_cookies() {
        let extractor = YtDlpExtractor::default().with_ffmpeg_location(Some(PathBuf::from("/opt/ffmpeg")));
        let args = extractor.download_args(&request(CredentialSource::Chrome), "Song");

        assert!(args.windows(2).any(|w| w == ["--audio-format", "flac"]));
        assert!(args.windows(2).any(|w| w == ["--cookies-from-browser", "chrome"]));
        assert!(args.windows(2).any(|w| w == ["--ffmpeg-location", "/opt/ffmpeg"]));
        assert!(args.windows(2).any(|w| w == ["--output", "/music/Song.%(ext)s"]));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://www.youtube.com/watch?v=abc"));
    }

    #[test]
    fn test_download_args_escape_percent_in_title() {
        let extractor = YtDlpExtractor::default();
        let args = extractor.download_args(&request(CredentialSource::None), "100% %(id)s Mix");

        assert!(args
            .windows(2)
            .any(|w| w == ["--output", "/music/100%% %%(id)s Mix.%(ext)s"]));
    }

    #[test]
    fn test_download_args_without_cookies() {
        let extractor = YtDlpExtractor::default();
        let args = extractor.download_args(&request(CredentialSource::None), "Song");

        assert!(!args.contains(&"--cookies-from-browser".to_string()));
        assert!(!args.contains(&"--ffmpeg-location".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_reports_failure() {
        let extractor = YtDlpExtractor::new("/nonexistent/yt-dlp-binary");
        assert!(!extractor.check_availability().await);

        let noop: ProgressCallback = std::sync::Arc::new(|_| {});
        let err = extractor
            .extract(&request(CredentialSource::None), noop)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to run"));
    }
}
