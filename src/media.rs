use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Quality choices offered when the caller doesn't pick an exact format.
pub const QUALITY_OPTIONS: &[&str] =
  &["144p", "240p", "360p", "480p", "720p", "1080p"];

/// User-chosen options that apply to every URL of a batch.
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
  pub audio_only: bool,
  pub resolution: Option<String>,
  pub format_id: Option<String>,
  pub convert_to_mp3: bool,
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
  pub url: String,
  pub options: DownloadOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaInfo {
  pub title: Option<String>,
  pub thumbnail: Option<String>,
}

/// A file produced by the extractor, living in the download directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
  pub path: PathBuf,
  pub file_name: String,
  pub title: Option<String>,
  pub height: Option<u32>,
}

impl DownloadOptions {
  pub fn validate(&self) -> Result<()> {
    if let Some(resolution) = self.resolution.as_deref() {
      parse_resolution(resolution)?;
    }
    Ok(())
  }

  /// Format selector handed to the extractor.
  ///
  /// Audio-only wins over any format or resolution choice. A resolution
  /// asks for a combined stream of that exact height and falls back to the
  /// best combined stream.
  pub fn selector(&self) -> Result<String> {
    if self.audio_only {
      return Ok("bestaudio/best".to_string());
    }

    if let Some(format_id) = self.format_id.as_deref().map(str::trim) {
      if !format_id.is_empty() {
        return Ok(format_id.to_string());
      }
    }

    match self.resolution.as_deref() {
      Some(res) => {
        let height = parse_resolution(res)?;
        Ok(format!(
          "best[height={height}][vcodec!=none][acodec!=none]/best"
        ))
      }
      None => Ok("best".to_string()),
    }
  }

  pub fn requested_height(&self) -> Option<u32> {
    if self.audio_only {
      return None;
    }
    self
      .resolution
      .as_deref()
      .and_then(|res| parse_resolution(res).ok())
  }
}

impl DownloadRequest {
  pub fn new(url: impl Into<String>, options: DownloadOptions) -> Self {
    Self {
      url: url.into(),
      options,
    }
  }
}

impl Artifact {
  /// Whether a requested resolution was unavailable and another one got
  /// delivered instead.
  pub fn resolution_fell_back(&self, options: &DownloadOptions) -> bool {
    match options.requested_height() {
      Some(requested) => self.height != Some(requested),
      None => false,
    }
  }
}

pub fn parse_resolution(res: &str) -> Result<u32> {
  let res = res.trim();
  res
    .strip_suffix('p')
    .unwrap_or(res)
    .parse::<u32>()
    .ok()
    .filter(|h| *h > 0)
    .ok_or_else(|| Error::InvalidResolution(res.to_string()))
}

pub fn parse_url(input: &str) -> Result<Url> {
  let input = input.trim();
  let url: Url = input
    .parse()
    .map_err(|_| Error::UnsupportedURL(input.into(), "not a valid url"))?;

  match url.scheme() {
    "http" | "https" => (),
    _ => return Err(Error::UnsupportedURL(input.into(), "not http(s)")),
  }

  if url.host_str().is_none() {
    return Err(Error::UnsupportedURL(input.into(), "missing host"));
  }

  Ok(url)
}

/// Split pasted text into URLs, one per line, ignoring blank lines.
pub fn split_urls(text: &str) -> Vec<String> {
  text
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod test {
  use super::*;

  fn options() -> DownloadOptions {
    DownloadOptions::default()
  }

  #[test]
  fn test_selector() {
    assert_eq!(options().selector().unwrap(), "best");

    let audio = DownloadOptions {
      audio_only: true,
      format_id: Some("22".into()),
      resolution: Some("720p".into()),
      ..options()
    };
    assert_eq!(audio.selector().unwrap(), "bestaudio/best");

    let exact = DownloadOptions {
      format_id: Some("18".into()),
      resolution: Some("720p".into()),
      ..options()
    };
    assert_eq!(exact.selector().unwrap(), "18");

    let res = DownloadOptions {
      resolution: Some("720p".into()),
      ..options()
    };
    assert_eq!(
      res.selector().unwrap(),
      "best[height=720][vcodec!=none][acodec!=none]/best"
    );

    let blank_id = DownloadOptions {
      format_id: Some("  ".into()),
      ..options()
    };
    assert_eq!(blank_id.selector().unwrap(), "best");
  }

  #[test]
  fn test_invalid_resolution() {
    let res = DownloadOptions {
      resolution: Some("tall".into()),
      ..options()
    };
    assert!(matches!(res.selector(), Err(Error::InvalidResolution(_))));
    assert!(res.validate().is_err());
    assert!(parse_resolution("0p").is_err());
    assert_eq!(parse_resolution(" 1080p ").unwrap(), 1080);
    assert_eq!(parse_resolution("480").unwrap(), 480);
  }

  #[test]
  fn test_resolution_fell_back() {
    let artifact = Artifact {
      path: PathBuf::from("downloads/a.mp4"),
      file_name: "a.mp4".into(),
      title: Some("a".into()),
      height: Some(360),
    };

    let wanted_720 = DownloadOptions {
      resolution: Some("720p".into()),
      ..options()
    };
    assert!(artifact.resolution_fell_back(&wanted_720));

    let wanted_360 = DownloadOptions {
      resolution: Some("360p".into()),
      ..options()
    };
    assert!(!artifact.resolution_fell_back(&wanted_360));
    assert!(!artifact.resolution_fell_back(&options()));

    let audio = DownloadOptions {
      audio_only: true,
      ..wanted_720
    };
    assert!(!artifact.resolution_fell_back(&audio));
  }

  #[test]
  fn test_parse_url() {
    assert!(parse_url(" https://www.youtube.com/watch?v=abc ").is_ok());
    assert!(parse_url("http://youtu.be/abc").is_ok());
    assert!(matches!(
      parse_url("ftp://example.com/a"),
      Err(Error::UnsupportedURL(_, "not http(s)"))
    ));
    assert!(parse_url("not a url").is_err());
  }

  #[test]
  fn test_split_urls() {
    let text = "https://a.example/1\n\n   \n  https://a.example/2  \r\n";
    assert_eq!(
      split_urls(text),
      vec!["https://a.example/1", "https://a.example/2"]
    );
  }
}
