#[cfg(test)]
pub mod fake;
mod ytdlp;

use std::path::Path;

use async_trait::async_trait;

use crate::{
  formats::FormatDescriptor,
  media::{Artifact, DownloadRequest, MediaInfo},
  progress::Progress,
  Result,
};

pub use ytdlp::Ytdlp;

/// Callback receiving progress updates while a download runs.
pub type OnProgress<'a> = &'a (dyn Fn(Progress) + Send + Sync);

#[async_trait]
pub trait Extractor: Send + Sync {
  /// Title and thumbnail, without fetching any media.
  async fn info(&self, url: &str) -> Result<MediaInfo>;

  /// Combined video+audio formats a user may pick from.
  async fn formats(&self, url: &str) -> Result<Vec<FormatDescriptor>>;

  /// URLs of the videos in a playlist.
  async fn playlist(&self, url: &str) -> Result<Vec<String>>;

  /// Fetch the selected stream into `dir`.
  async fn download(
    &self,
    request: &DownloadRequest,
    dir: &Path,
    on_progress: OnProgress<'_>,
  ) -> Result<Artifact>;
}
