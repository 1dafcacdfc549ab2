use std::{collections::HashMap, path::Path};

use async_trait::async_trait;

use crate::{
  formats::FormatDescriptor,
  media::{Artifact, DownloadRequest, MediaInfo},
  progress::Progress,
  Error, Result,
};

use super::{Extractor, OnProgress};

/// In-process extractor for tests: every URL containing "broken" fails,
/// everything else downloads a small file named after the last URL
/// segment. Videos top out at 720p.
#[derive(Default)]
pub struct FakeExtractor {
  pub playlists: HashMap<String, Vec<String>>,
}

pub const MAX_HEIGHT: u32 = 720;

fn title_of(url: &str) -> String {
  url.rsplit(['/', '=']).next().unwrap_or("video").to_string()
}

fn check(url: &str) -> Result<()> {
  if url.contains("broken") {
    return Err(Error::Extraction(format!("ERROR: unavailable: {url}")));
  }
  Ok(())
}

#[async_trait]
impl Extractor for FakeExtractor {
  async fn info(&self, url: &str) -> Result<MediaInfo> {
    check(url)?;
    Ok(MediaInfo {
      title: Some(title_of(url)),
      thumbnail: Some(format!("{url}/thumb.jpg")),
    })
  }

  async fn formats(&self, url: &str) -> Result<Vec<FormatDescriptor>> {
    check(url)?;
    Ok(
      [(18, 360), (22, MAX_HEIGHT)]
        .into_iter()
        .map(|(id, height)| FormatDescriptor {
          format_id: id.to_string(),
          ext: "mp4".into(),
          resolution: format!("{height}p"),
          filesize_mb: 1.5,
          format_note: String::new(),
          height,
        })
        .collect(),
    )
  }

  async fn playlist(&self, url: &str) -> Result<Vec<String>> {
    check(url)?;
    Ok(self.playlists.get(url).cloned().unwrap_or_default())
  }

  async fn download(
    &self,
    request: &DownloadRequest,
    dir: &Path,
    on_progress: OnProgress<'_>,
  ) -> Result<Artifact> {
    check(&request.url)?;

    let options = &request.options;
    let title = title_of(&request.url);
    let (ext, height) = if options.audio_only || options.convert_to_mp3 {
      ("mp3", None)
    } else {
      let height = options.requested_height().unwrap_or(MAX_HEIGHT);
      ("mp4", Some(height.min(MAX_HEIGHT)))
    };

    on_progress(Progress {
      downloaded: 2,
      total: Some(4),
      speed: Some(1.0),
      eta: Some(2),
      finished: false,
    });

    let file_name = format!("{title}.{ext}");
    let path = dir.join(&file_name);
    tokio::fs::write(&path, format!("data:{}", request.url)).await?;

    on_progress(Progress {
      downloaded: 4,
      total: Some(4),
      finished: true,
      ..Default::default()
    });

    Ok(Artifact {
      path,
      file_name,
      title: Some(title),
      height,
    })
  }
}
