use std::path::{Path, PathBuf};

use crate::extractors::AudioFormat;

/// Playlist parameter following the video id; it and everything after it is dropped
const TRAILING_PLAYLIST_PARAM: &str = "&list=";

/// Playlist parameter opening the query; only the parameter itself is dropped
const LEADING_PLAYLIST_PARAM: &str = "?list=";

/// Characters rejected by at least one common filesystem
const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Longest file stem produced by [`sanitize_filename`], in characters
pub const MAX_FILENAME_CHARS: usize = 200;

/// Check whether `url` targets one of `hosts`.
///
/// This is a substring match, not a URL parse: the host must sit on a host boundary so
/// that `youtube.com` matches `https://m.youtube.com/watch` but not `https://notyoutube.com/`.
pub fn is_supported_url<S: AsRef<str>>(url: &str, hosts: &[S]) -> bool {
    let url_lower = url.trim().to_lowercase();

    hosts.iter().any(|host| {
        let host = host.as_ref().to_lowercase();
        if host.is_empty() {
            return false;
        }

        url_lower.match_indices(&host).any(|(start, _)| {
            let before = url_lower[..start].chars().next_back();
            let after = url_lower[start + host.len()..].chars().next();

            matches!(before, None | Some('/') | Some('.') | Some('@'))
                && matches!(after, None | Some('/') | Some('?') | Some('#') | Some(':'))
        })
    })
}

/// Whether `url` carries a playlist parameter
pub fn is_playlist_url(url: &str) -> bool {
    url.contains(TRAILING_PLAYLIST_PARAM) || url.contains(LEADING_PLAYLIST_PARAM)
}

/// Remove playlist parameters so only the addressed video remains.
///
/// `&list=` cuts the URL. A leading `?list=` only removes that one parameter, keeping
/// whatever follows (`watch?list=PL&v=abc` becomes `watch?v=abc`).
/// Returns the single-item URL and whether anything was stripped.
pub fn strip_playlist(url: &str) -> (String, bool) {
    let mut normalized = match url.find(TRAILING_PLAYLIST_PARAM) {
        Some(index) => url[..index].to_string(),
        None => url.to_string(),
    };

    if let Some(index) = normalized.find(LEADING_PLAYLIST_PARAM) {
        let param_start = index + 1;
        match normalized[param_start..].find('&') {
            Some(offset) => normalized.replace_range(param_start..=param_start + offset, ""),
            None => normalized.truncate(index),
        }
    }

    let stripped = normalized != url;
    (normalized, stripped)
}

/// Sanitize a media title for safe filesystem usage
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c) && !c.is_control())
        .collect();

    let capped: String = cleaned.trim().chars().take(MAX_FILENAME_CHARS).collect();
    let capped = capped.trim_end();

    if capped.is_empty() {
        "audio".to_string()
    } else {
        capped.to_string()
    }
}

/// Path the converted audio for `title` ends up at
pub fn output_path_for(output_dir: &Path, title: &str, format: AudioFormat) -> PathBuf {
    output_dir.join(format!("{}.{}", sanitize_filename(title), format.extension()))
}

/// Shorten a message to at most `max_chars` characters
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    let message = message.trim();
    if message.chars().count() <= max_chars {
        return message.to_string();
    }

    let keep = max_chars.saturating_sub(3);
    let head: String = message.chars().take(keep).collect();
    format!("{}...", head.trim_end())
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Check if the transcoder yt-dlp hands off to is installed
pub async fn check_dependencies(ffmpeg_location: Option<&Path>) -> Vec<String> {
    let mut missing = Vec::new();

    let ffmpeg = ffmpeg_location
        .map(|location| {
            if location.is_dir() {
                location.join("ffmpeg")
            } else {
                location.to_path_buf()
            }
        })
        .unwrap_or_else(|| PathBuf::from("ffmpeg"));

    if !check_command_available(&ffmpeg.to_string_lossy(), "-version").await {
        missing.push(format!("{} - required for lossless conversion", ffmpeg.display()));
    }

    missing
}

/// Check if a command is available in PATH
pub async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
