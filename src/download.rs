use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use bytes::Bytes;
use tracing::{info, warn};

use crate::{
  extractor::{Extractor, OnProgress},
  media::{parse_url, Artifact, DownloadOptions, DownloadRequest},
  progress::{Progress, ProgressBoard},
  Error, Result,
};

/// Progress callback for batches, told which URL the update belongs to.
pub type OnBatchProgress<'a> = &'a (dyn Fn(&str, Progress) + Send + Sync);

/// Result of downloading several URLs one after another.
#[derive(Debug, Default)]
pub struct Batch {
  pub saved: Vec<Artifact>,
  pub failed: Vec<(String, Error)>,
}

/// Runs downloads into a single directory, one at a time.
#[derive(Clone)]
pub struct Downloader {
  extractor: Arc<dyn Extractor>,
  dir: PathBuf,
  board: ProgressBoard,
}

impl Downloader {
  pub fn new(extractor: Arc<dyn Extractor>, dir: impl Into<PathBuf>) -> Self {
    Self {
      extractor,
      dir: dir.into(),
      board: ProgressBoard::default(),
    }
  }

  pub fn extractor(&self) -> &dyn Extractor {
    &*self.extractor
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn board(&self) -> &ProgressBoard {
    &self.board
  }

  pub async fn download_one(
    &self,
    request: &DownloadRequest,
    on_progress: OnProgress<'_>,
  ) -> Result<Artifact> {
    parse_url(&request.url)?;
    request.options.validate()?;
    tokio::fs::create_dir_all(&self.dir).await?;

    let url = request.url.as_str();
    let track = |progress: Progress| {
      self.board.update(url, progress);
      on_progress(progress);
    };

    let result = self.extractor.download(request, &self.dir, &track).await;
    self.board.clear(url);
    let artifact = result?;

    if artifact.resolution_fell_back(&request.options) {
      warn!(
        "requested resolution {} not available for {}, downloaded {} instead",
        request.options.resolution.as_deref().unwrap_or_default(),
        artifact.title.as_deref().unwrap_or(url),
        artifact
          .height
          .map(|h| format!("{h}p"))
          .unwrap_or_else(|| "highest available".to_string()),
      );
    }

    info!("{} downloaded to {}", url, artifact.path.display());
    Ok(artifact)
  }

  /// Download every request in turn. A failing URL is reported and skipped.
  pub async fn download_many(
    &self,
    requests: &[DownloadRequest],
    on_progress: OnBatchProgress<'_>,
  ) -> Batch {
    let mut batch = Batch::default();

    for request in requests.iter().filter(|r| !r.url.trim().is_empty()) {
      let url = request.url.as_str();
      let progress = |p: Progress| on_progress(url, p);

      match self.download_one(request, &progress).await {
        Ok(artifact) => batch.saved.push(artifact),
        Err(e) => {
          warn!("failed to download {}: {}", url, e);
          batch.failed.push((url.to_string(), e));
        }
      }
    }

    batch
  }

  pub async fn download_playlist(
    &self,
    playlist_url: &str,
    options: &DownloadOptions,
    on_progress: OnBatchProgress<'_>,
  ) -> Result<Batch> {
    parse_url(playlist_url)?;
    let urls = self.extractor.playlist(playlist_url.trim()).await?;
    info!("playlist {} has {} videos", playlist_url, urls.len());

    let requests = requests_for(&urls, options);
    Ok(self.download_many(&requests, on_progress).await)
  }

  /// Download, then hand the bytes over and remove the file from disk.
  pub async fn download_to_memory(
    &self,
    request: &DownloadRequest,
  ) -> Result<(String, Bytes)> {
    let artifact = self.download_one(request, &|_| ()).await?;
    let bytes = take_file(&artifact.path).await?;
    Ok((artifact.file_name, bytes))
  }

  /// Map a client supplied path onto a file inside the download directory.
  /// Only the final path component is honored.
  pub fn resolve_file(&self, requested: &str) -> Result<PathBuf> {
    let name = Path::new(requested)
      .file_name()
      .ok_or(Error::FileNotFound)?;
    let path = self.dir.join(name);

    if path.is_file() {
      Ok(path)
    } else {
      Err(Error::FileNotFound)
    }
  }
}

/// The same options for every URL; blank entries are dropped.
pub fn requests_for(urls: &[String], options: &DownloadOptions) -> Vec<DownloadRequest> {
  urls
    .iter()
    .map(|url| url.trim())
    .filter(|url| !url.is_empty())
    .map(|url| DownloadRequest::new(url, options.clone()))
    .collect()
}

/// Read a file into memory and delete it.
pub async fn take_file(path: &Path) -> Result<Bytes> {
  let bytes = tokio::fs::read(path).await?;
  if let Err(e) = tokio::fs::remove_file(path).await {
    warn!("failed to delete {}: {}", path.display(), e);
  }
  Ok(Bytes::from(bytes))
}
