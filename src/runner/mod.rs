use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::extractors::{
    AudioExtractor, AudioFormat, CredentialSource, ExtractOutput, ExtractRequest, ProgressCallback, ProgressEvent,
};
use crate::utils::{format_duration, is_supported_url, strip_playlist, truncate_message};
use crate::JobError;

pub mod failure;
pub mod status;

pub use failure::classify_failure;
pub use status::{JobHandle, JobResult, JobState, JobStatus, LogEntry, StatusBoard};

/// Everything a job needs besides the URL
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Host substrings a URL must contain to be accepted
    pub hosts: Vec<String>,
    pub output_dir: PathBuf,
    pub audio_format: AudioFormat,
    pub audio_quality: String,
    pub single_item: bool,
    pub primary_source: CredentialSource,
    /// Source tried once when the primary one is rejected
    pub fallback_source: Option<CredentialSource>,
    /// Percentage interval at which download progress is written to the log
    pub progress_log_step: f64,
    /// Upper bound for raw error text kept in messages and the log
    pub max_error_chars: usize,
}

impl RunnerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hosts: config.sites.hosts.clone(),
            output_dir: config.download.output_dir.clone(),
            audio_format: config.download.audio_format,
            audio_quality: config.download.audio_quality.clone(),
            single_item: config.download.single_item,
            primary_source: config.credentials.primary,
            fallback_source: config.credentials.fallback,
            progress_log_step: config.app.progress_log_step,
            max_error_chars: config.app.max_error_chars,
        }
    }

    fn request(&self, url: &str, credential_source: CredentialSource) -> ExtractRequest {
        ExtractRequest {
            url: url.to_string(),
            output_dir: self.output_dir.clone(),
            audio_format: self.audio_format,
            audio_quality: self.audio_quality.clone(),
            single_item: self.single_item,
            credential_source,
        }
    }

    /// Fallback source, if one is configured and differs from the primary
    fn retry_source(&self) -> Option<CredentialSource> {
        self.fallback_source.filter(|source| *source != self.primary_source)
    }
}

/// Acknowledgement returned by [`JobRunner::submit`]
#[derive(Debug)]
pub struct JobTicket {
    pub job_id: Uuid,
    /// URL handed to the extractor, playlist markers removed
    pub url: String,
    task: JoinHandle<()>,
}

impl JobTicket {
    /// Wait for the background task to finish. Not needed for normal operation; `poll` reports the outcome.
    pub async fn finished(self) {
        if let Err(err) = self.task.await {
            tracing::error!(job_id = %self.job_id, "Job task aborted: {}", err);
        }
    }
}

/// Runs one audio extraction job at a time in the background and tracks its status
#[derive(Clone)]
pub struct JobRunner {
    extractor: Arc<dyn AudioExtractor>,
    board: Arc<StatusBoard>,
    settings: Arc<RunnerSettings>,
}

impl JobRunner {
    pub fn new(extractor: Arc<dyn AudioExtractor>, settings: RunnerSettings) -> Self {
        Self {
            extractor,
            board: Arc::new(StatusBoard::new()),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Validate `url`, reset the status record and start the job in the background.
    ///
    /// Returns as soon as the task is spawned. A job still running from an earlier submit keeps
    /// running, but its status updates are no longer recorded.
    pub fn submit(&self, url: &str) -> Result<JobTicket, JobError> {
        let url = url.trim();
        if !is_supported_url(url, &self.settings.hosts) {
            tracing::warn!(%url, "Rejecting URL outside the supported hosts");
            return Err(JobError::InvalidInput(url.to_string()));
        }

        let (normalized, playlist_stripped) = strip_playlist(url);
        let job_id = Uuid::new_v4();

        if let Some(displaced) = self.board.begin(job_id, "Download requested") {
            tracing::warn!(%displaced, %job_id, "New job preempts status tracking of a running job");
        }

        let handle = JobHandle::new(self.board.clone(), job_id);
        let task = tokio::spawn(
            run_job(
                self.extractor.clone(),
                self.settings.clone(),
                handle,
                normalized.clone(),
                playlist_stripped,
            )
            .instrument(tracing::info_span!("job", %job_id)),
        );

        tracing::info!(%job_id, url = %normalized, "Job submitted");

        Ok(JobTicket {
            job_id,
            url: normalized,
            task,
        })
    }

    /// Copy of the current job status
    pub fn poll(&self) -> JobStatus {
        self.board.snapshot()
    }
}

async fn run_job(
    extractor: Arc<dyn AudioExtractor>,
    settings: Arc<RunnerSettings>,
    handle: JobHandle,
    url: String,
    playlist_stripped: bool,
) {
    let started = Instant::now();

    if playlist_stripped {
        handle.log("Playlist parameters removed, only the first item is downloaded");
    }
    handle.log(format!("URL: {}", url));
    handle.report(JobState::Downloading, "Preparing download...", true);

    let primary = settings.primary_source;
    let outcome = match attempt(extractor.as_ref(), &settings, &handle, &url, primary).await {
        Ok(output) => Ok((output, primary)),
        Err(error) => match settings.retry_source() {
            Some(fallback) if error.allows_credential_fallback() => {
                tracing::warn!(%primary, %fallback, "Credential source rejected, retrying once");
                handle.report(
                    JobState::Downloading,
                    format!("Credential source {} failed, fallback attempt with {}", primary, fallback),
                    true,
                );

                match attempt(extractor.as_ref(), &settings, &handle, &url, fallback).await {
                    Ok(output) => Ok((output, fallback)),
                    Err(retry_error) => Err(format!(
                        "Fallback credential source {} also failed: {}",
                        fallback, retry_error
                    )),
                }
            }
            _ => Err(error.to_string()),
        },
    };

    let elapsed = format_duration(started.elapsed().as_secs_f64());

    match outcome {
        Ok((output, _)) if output.output_path.as_os_str().is_empty() => {
            tracing::error!(title = %output.title, "Extractor reported success without an output path");
            handle.fail("Download finished but no output file was reported");
        }
        Ok((output, credential_source)) => {
            tracing::info!(title = %output.title, path = %output.output_path.display(), %elapsed, "Job complete");
            handle.log(format!("Saved to {}", output.output_path.display()));
            handle.complete(
                JobResult {
                    title: output.title.clone(),
                    output_path: output.output_path,
                    credential_source,
                },
                format!("Complete: {}", output.title),
            );
        }
        Err(message) => {
            tracing::error!(%elapsed, "Job failed: {}", message);
            handle.fail(message);
        }
    }
}

/// One extractor invocation with `source`, classified on failure
async fn attempt(
    extractor: &dyn AudioExtractor,
    settings: &RunnerSettings,
    handle: &JobHandle,
    url: &str,
    source: CredentialSource,
) -> Result<ExtractOutput, JobError> {
    let request = settings.request(url, source);
    handle.log(format!(
        "Running {} (credential source: {})",
        extractor.platform_name(),
        source
    ));

    let progress = progress_callback(handle.clone(), settings.progress_log_step, settings.audio_format);

    extractor.extract(&request, progress).await.map_err(|err| {
        let raw = format!("{:#}", err);
        tracing::warn!(%source, error = %raw, "Extraction attempt failed");
        handle.log(format!(
            "Attempt with {} failed: {}",
            source,
            truncate_message(&raw, settings.max_error_chars)
        ));
        classify_failure(&raw, settings.max_error_chars)
    })
}

/// Map extractor progress onto the job status
fn progress_callback(handle: JobHandle, log_step: f64, format: AudioFormat) -> ProgressCallback {
    let log_step = log_step.clamp(1.0, 100.0);
    let last_bucket: Mutex<Option<i64>> = Mutex::new(None);

    Arc::new(move |event: ProgressEvent| match event {
        ProgressEvent::Downloading { percent, speed } => {
            let message = format!(
                "Downloading {} (speed: {})",
                percent.map(|p| format!("{:.1}%", p)).unwrap_or_else(|| "N/A".to_string()),
                speed.as_deref().unwrap_or("N/A")
            );

            let bucket = percent.map(|p| (p / log_step).floor() as i64);
            let mut last = last_bucket.lock();
            let crossed = bucket.is_some() && bucket != *last;
            if crossed {
                *last = bucket;
            }

            handle.report(JobState::Downloading, message, crossed);
        }
        ProgressEvent::Finished => {
            *last_bucket.lock() = None;
            handle.transition(
                JobState::Converting,
                format!("Download finished, converting to {}...", format.codec().to_uppercase()),
            );
        }
    })
}
