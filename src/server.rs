use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
  body::StreamBody,
  extract::{Query, State},
  http::header,
  response::{Html, IntoResponse, Response},
  routing::{get, post},
  Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::{
  config::ServeConfig,
  download::{Batch, Downloader},
  formats::FormatDescriptor,
  media::{
    parse_url, Artifact, DownloadOptions, DownloadRequest, MediaInfo,
    QUALITY_OPTIONS,
  },
  progress::Progress,
  util::attachment_disposition,
  Result,
};

pub const HOMEPAGE_HTML: &str = include_str!("../html/homepage.html");

#[derive(Clone)]
pub struct AppState {
  downloader: Downloader,
  keep_files: bool,
}

impl AppState {
  pub fn new(downloader: Downloader, keep_files: bool) -> Self {
    Self {
      downloader,
      keep_files,
    }
  }
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/", get(homepage))
    .route("/health", get(health))
    .route("/qualities", get(qualities))
    .route("/info", get(media_info))
    .route("/formats", get(formats))
    .route("/progress", get(progress))
    .route("/download_video", post(download_video))
    .route("/download_playlist", post(download_playlist))
    .route("/downloaded_file", get(downloaded_file))
    .route("/download", get(download_direct))
    .with_state(state)
}

/// Serve until SIGINT/SIGTERM.
pub async fn serve(state: AppState, config: ServeConfig) -> Result<()> {
  let server = Server {
    state,
    config: Arc::new(config),
  };

  Toplevel::new(move |s| async move {
    s.start(SubsystemBuilder::new("http", move |subsys| server.run(subsys)));
  })
  .catch_signals()
  .handle_shutdown_requests(Duration::from_secs(5))
  .await
  .map_err(|e| anyhow::anyhow!("shutdown failed: {e}"))?;

  Ok(())
}

struct Server {
  state: AppState,
  config: Arc<ServeConfig>,
}

impl Server {
  async fn run(self, subsys: SubsystemHandle) -> Result<()> {
    let addr = self.config.listen;
    info!("Listening on http://{}", addr);

    axum::Server::try_bind(&addr)
      .with_context(|| format!("failed to bind {addr}"))?
      .serve(router(self.state).into_make_service())
      .with_graceful_shutdown(subsys.on_shutdown_requested())
      .await
      .context("http server failed")?;

    info!("server stopped");
    Ok(())
  }
}

async fn homepage() -> impl IntoResponse {
  Html(HOMEPAGE_HTML)
}

async fn health() -> impl IntoResponse {
  "ok".to_owned()
}

async fn qualities() -> Json<&'static [&'static str]> {
  Json(QUALITY_OPTIONS)
}

#[derive(Deserialize)]
struct UrlQuery {
  url: String,
}

async fn media_info(
  State(state): State<AppState>,
  Query(query): Query<UrlQuery>,
) -> Result<Json<MediaInfo>> {
  let url = parse_url(&query.url)?;
  let info = state.downloader.extractor().info(url.as_str()).await?;
  Ok(Json(info))
}

#[derive(Serialize)]
struct FormatOption {
  #[serde(flatten)]
  format: FormatDescriptor,
  label: String,
}

async fn formats(
  State(state): State<AppState>,
  Query(query): Query<UrlQuery>,
) -> Result<Json<Vec<FormatOption>>> {
  let url = parse_url(&query.url)?;
  let formats = state.downloader.extractor().formats(url.as_str()).await?;

  let options = formats
    .into_iter()
    .map(|format| FormatOption {
      label: format.label(),
      format,
    })
    .collect();
  Ok(Json(options))
}

async fn progress(
  State(state): State<AppState>,
  Query(query): Query<UrlQuery>,
) -> Json<Option<Progress>> {
  Json(state.downloader.board().get(query.url.trim()))
}

#[derive(Deserialize)]
struct VideoDownloadRequest {
  url: String,
  #[serde(default)]
  audio_only: bool,
  resolution: Option<String>,
  format_id: Option<String>,
  #[serde(default)]
  convert_to_mp3: bool,
}

#[derive(Deserialize)]
struct PlaylistDownloadRequest {
  playlist_url: String,
  #[serde(default)]
  audio_only: bool,
  resolution: Option<String>,
  #[serde(default)]
  convert_to_mp3: bool,
}

#[derive(Serialize, Debug)]
struct DownloadedFile {
  file_path: String,
  file_name: String,
}

// forms send empty strings for unset fields
fn non_blank(s: Option<String>) -> Option<String> {
  s.filter(|s| !s.trim().is_empty())
}

#[derive(Serialize, Debug)]
struct FailedDownload {
  url: String,
  detail: String,
}

#[derive(Serialize, Debug)]
struct PlaylistDownload {
  files: Vec<DownloadedFile>,
  failed: Vec<FailedDownload>,
}

impl From<Batch> for PlaylistDownload {
  fn from(batch: Batch) -> Self {
    Self {
      files: batch.saved.into_iter().map(Into::into).collect(),
      failed: batch
        .failed
        .into_iter()
        .map(|(url, err)| FailedDownload {
          url,
          detail: err.to_string(),
        })
        .collect(),
    }
  }
}

impl VideoDownloadRequest {
  fn into_request(self) -> DownloadRequest {
    let options = DownloadOptions {
      audio_only: self.audio_only,
      resolution: non_blank(self.resolution),
      format_id: non_blank(self.format_id),
      convert_to_mp3: self.convert_to_mp3,
    };
    DownloadRequest::new(self.url.trim(), options)
  }
}

impl PlaylistDownloadRequest {
  fn options(&self) -> DownloadOptions {
    DownloadOptions {
      audio_only: self.audio_only,
      resolution: non_blank(self.resolution.clone()),
      format_id: None,
      convert_to_mp3: self.convert_to_mp3,
    }
  }
}

impl From<Artifact> for DownloadedFile {
  fn from(artifact: Artifact) -> Self {
    Self {
      file_path: artifact.path.display().to_string(),
      file_name: artifact.file_name,
    }
  }
}

#[axum::debug_handler]
async fn download_video(
  State(state): State<AppState>,
  Json(body): Json<VideoDownloadRequest>,
) -> Result<Json<DownloadedFile>> {
  let request = body.into_request();
  let artifact = state.downloader.download_one(&request, &|_| ()).await?;
  Ok(Json(artifact.into()))
}

async fn download_playlist(
  State(state): State<AppState>,
  Json(body): Json<PlaylistDownloadRequest>,
) -> Result<Json<PlaylistDownload>> {
  let batch = state
    .downloader
    .download_playlist(&body.playlist_url, &body.options(), &|_, _| ())
    .await?;

  Ok(Json(batch.into()))
}

#[derive(Deserialize)]
struct FileQuery {
  file_path: String,
}

async fn downloaded_file(
  State(state): State<AppState>,
  Query(query): Query<FileQuery>,
) -> Result<Response> {
  let path = state.downloader.resolve_file(&query.file_path)?;
  let file_name = path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();

  let file = tokio::fs::File::open(&path).await?;
  if !state.keep_files {
    // the open handle keeps the data readable until the stream ends
    if let Err(err) = tokio::fs::remove_file(&path).await {
      warn!("failed to remove {}: {err}", path.display());
    }
  }

  let body = StreamBody::new(ReaderStream::new(file));
  Ok(attachment(&file_name, body))
}

async fn download_direct(
  State(state): State<AppState>,
  Query(query): Query<VideoDownloadRequest>,
) -> Result<Response> {
  let request = query.into_request();
  let (file_name, bytes) = state.downloader.download_to_memory(&request).await?;
  Ok(attachment(&file_name, bytes))
}

fn attachment(file_name: &str, body: impl IntoResponse) -> Response {
  (
    [
      (header::CONTENT_TYPE, "application/octet-stream".to_string()),
      (header::CONTENT_DISPOSITION, attachment_disposition(file_name)),
    ],
    body,
  )
    .into_response()
}
