use serde::{Deserialize, Serialize};

/// One format entry as reported by the extractor's `-J` output.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawFormat {
  pub format_id: String,
  pub ext: Option<String>,
  pub vcodec: Option<String>,
  pub acodec: Option<String>,
  pub height: Option<u32>,
  pub format_note: Option<String>,
  pub filesize: Option<f64>,
  pub filesize_approx: Option<f64>,
}

/// A downloadable encoding offered to the user.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FormatDescriptor {
  pub format_id: String,
  pub ext: String,
  pub resolution: String,
  pub filesize_mb: f64,
  pub format_note: String,
  pub height: u32,
}

impl RawFormat {
  fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref().map_or(false, |c| c != "none")
  }

  // carries both a video and an audio track
  fn is_combined(&self) -> bool {
    Self::has_codec(&self.vcodec) && Self::has_codec(&self.acodec)
  }

  fn note(&self) -> &str {
    self.format_note.as_deref().unwrap_or_default()
  }

  fn size_mb(&self) -> f64 {
    let bytes = self
      .filesize
      .filter(|s| *s > 0.0)
      .or(self.filesize_approx)
      .unwrap_or(0.0);
    bytes / (1024.0 * 1024.0)
  }

  fn ext(&self) -> String {
    self.ext.clone().unwrap_or_else(|| "mp4".to_string())
  }
}

impl FormatDescriptor {
  /// Human readable choice, e.g. `720p - 720p (12.3MB)`.
  pub fn label(&self) -> String {
    let mut label = self.resolution.clone();
    if !self.format_note.is_empty() {
      label.push_str(" - ");
      label.push_str(&self.format_note);
    }
    if self.filesize_mb > 0.0 {
      label.push_str(&format!(" ({:.1}MB)", self.filesize_mb));
    }
    label
  }
}

/// Keep the combined video+audio formats that carry some resolution hint,
/// ordered from lowest to highest. When none qualifies, the first combined
/// format is offered as "Best Quality".
pub fn combined_formats(raw: &[RawFormat]) -> Vec<FormatDescriptor> {
  let mut formats: Vec<FormatDescriptor> = raw
    .iter()
    .filter(|f| f.is_combined())
    .filter(|f| f.height.is_some() || !f.note().is_empty())
    .map(|f| FormatDescriptor {
      format_id: f.format_id.clone(),
      ext: f.ext(),
      resolution: match f.height {
        Some(height) => format!("{height}p"),
        None => f.note().to_string(),
      },
      filesize_mb: f.size_mb(),
      format_note: f.note().to_string(),
      height: f.height.unwrap_or(0),
    })
    .collect();

  // stable, so equal heights keep the extractor's order
  formats.sort_by_key(|f| f.height);

  if formats.is_empty() {
    if let Some(best) = raw.iter().find(|f| f.is_combined()) {
      // a note that is present but empty stays empty
      let note = best
        .format_note
        .clone()
        .unwrap_or_else(|| "Best Quality".to_string());
      formats.push(FormatDescriptor {
        format_id: best.format_id.clone(),
        ext: best.ext(),
        resolution: "Best Quality".to_string(),
        filesize_mb: best.size_mb(),
        format_note: note,
        height: 0,
      });
    }
  }

  formats
}
