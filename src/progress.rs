use std::{
  collections::HashMap,
  fmt,
  sync::{Arc, RwLock},
};

use serde::Serialize;

/// Prefix of the lines produced by [`PROGRESS_TEMPLATE`].
pub const PROGRESS_MARKER: &str = "progress:";

/// Progress template handed to yt-dlp. Fields are `|`-separated and
/// unavailable ones are rendered as `NA`.
pub const PROGRESS_TEMPLATE: &str = "download:progress:\
  %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|\
  %(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s";

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct Progress {
  pub downloaded: u64,
  /// exact size when known, otherwise the extractor's estimate
  pub total: Option<u64>,
  pub speed: Option<f64>,
  pub eta: Option<u64>,
  pub finished: bool,
}

impl Progress {
  pub fn parse(line: &str) -> Option<Progress> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let fields: Vec<&str> = rest.split('|').map(str::trim).collect();
    let [status, downloaded, total, estimate, speed, eta] = fields[..] else {
      return None;
    };

    let number = |s: &str| match s {
      "NA" | "None" | "" => None,
      s => s.parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0),
    };

    Some(Progress {
      downloaded: number(downloaded).unwrap_or(0.0) as u64,
      total: number(total).or_else(|| number(estimate)).map(|n| n as u64),
      speed: number(speed),
      eta: number(eta).map(|n| n as u64),
      finished: status == "finished",
    })
  }

  pub fn ratio(&self) -> Option<f64> {
    match self.total {
      Some(total) if total > 0 => {
        Some((self.downloaded as f64 / total as f64).min(1.0))
      }
      _ => None,
    }
  }
}

impl fmt::Display for Progress {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let downloaded = format_size(self.downloaded as f64);
    match self.total {
      Some(total) => write!(f, "📥 {}/{}", downloaded, format_size(total as f64))?,
      None => write!(f, "📥 {}", downloaded)?,
    }

    write!(f, "  🚀 {}", format_speed(self.speed.unwrap_or(0.0)))?;

    match self.eta {
      Some(eta) if eta > 0 && !self.finished => {
        write!(f, "  ⏱️ {eta}s remaining")
      }
      _ => write!(f, "  ⚙️ Processing..."),
    }
  }
}

pub fn format_size(bytes: f64) -> String {
  let mut size = bytes;
  for unit in ["B", "KB", "MB", "GB"] {
    if size < 1024.0 {
      return format!("{size:.1} {unit}");
    }
    size /= 1024.0;
  }
  format!("{size:.1} TB")
}

pub fn format_speed(bytes_per_second: f64) -> String {
  if bytes_per_second == 0.0 {
    return "0 B/s".to_string();
  }
  format!("{}/s", format_size(bytes_per_second))
}

/// Latest progress per URL, shared between a running download and
/// whoever polls for it.
#[derive(Debug, Default, Clone)]
pub struct ProgressBoard {
  dict: Arc<RwLock<HashMap<String, Progress>>>,
}

impl ProgressBoard {
  pub fn update(&self, url: &str, progress: Progress) {
    if let Ok(mut dict) = self.dict.write() {
      dict.insert(url.to_string(), progress);
    }
  }

  pub fn get(&self, url: &str) -> Option<Progress> {
    self.dict.read().ok()?.get(url).copied()
  }

  pub fn clear(&self, url: &str) {
    if let Ok(mut dict) = self.dict.write() {
      dict.remove(url);
    }
  }
}
