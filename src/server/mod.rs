//! Local web surface: a minimal page plus the submit and status endpoints it polls.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::runner::{JobRunner, JobStatus};

const INDEX_HTML: &str = include_str!("index.html");

/// Shared state of the router
#[derive(Clone)]
pub struct AppState {
    pub runner: JobRunner,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadAccepted {
    pub status: String,
    pub job_id: Uuid,
    pub url: String,
}

/// API error response body
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(&self)).into_response()
    }
}

/// Build the router
pub fn router(runner: JobRunner) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/download", post(start_download))
        .route("/status", get(status))
        .route("/favicon.ico", get(favicon))
        .with_state(AppState { runner })
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn start_download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Result<(StatusCode, Json<DownloadAccepted>), ApiError> {
    if request.url.trim().is_empty() {
        return Err(ApiError::bad_request("URL_REQUIRED", "A URL is required"));
    }

    // Job failures surface through /status; submit only rejects the input itself
    let ticket = state
        .runner
        .submit(&request.url)
        .map_err(|err| ApiError::bad_request("INVALID_INPUT", err.to_string()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DownloadAccepted {
            status: "started".to_string(),
            job_id: ticket.job_id,
            url: ticket.url,
        }),
    ))
}

async fn status(State(state): State<AppState>) -> Json<JobStatus> {
    Json(state.runner.poll())
}

async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Serve until Ctrl-C, optionally opening the page in the default browser once bound
pub async fn serve(runner: JobRunner, addr: SocketAddr, open_browser: bool) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let page = format!("http://{}", listener.local_addr()?);
    tracing::info!("Web page listening on {}", page);

    if open_browser {
        tokio::task::spawn_blocking(move || {
            if let Err(err) = webbrowser::open(&page) {
                tracing::warn!("Could not open {} in a browser: {}", page, err);
            }
        });
    }

    axum::serve(listener, router(runner))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", err);
            }
            tracing::info!("Web server shutting down...");
        })
        .await?;

    Ok(())
}
