use std::{
  ffi::OsString,
  path::{Path, PathBuf},
  process::Stdio,
};

use anyhow::Context;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use tokio::{
  io::{AsyncBufReadExt, BufReader},
  process::Command,
  sync::Semaphore,
};
use tracing::{debug, info, warn};

use crate::{
  config::Config,
  formats::{combined_formats, FormatDescriptor, RawFormat},
  media::{Artifact, DownloadRequest, MediaInfo},
  progress::{Progress, PROGRESS_TEMPLATE},
  util::redact_proxy,
  Error, Result,
};

use super::{Extractor, OnProgress};

const FILEPATH_MARKER: &str = "@filepath=";
const TITLE_MARKER: &str = "@title=";
const HEIGHT_MARKER: &str = "@height=";

// run yt-dlp command line for metadata and downloads.
// requires yt-dlp executable to be in PATH (or configured).
pub struct Ytdlp {
  program: PathBuf,
  proxy: Option<String>,
  // only one yt-dlp process at a time
  guard: Semaphore,
}

impl Ytdlp {
  pub fn new(config: &Config) -> Self {
    if let Some(proxy) = &config.proxy {
      info!("using proxy: {}", redact_proxy(proxy));
    }

    Self {
      program: config.ytdlp.clone(),
      proxy: config.proxy.clone(),
      guard: Semaphore::new(1),
    }
  }

  fn command(&self) -> Command {
    let mut cmd = Command::new(&self.program);
    cmd.kill_on_drop(true).stdin(Stdio::null());
    if let Some(proxy) = &self.proxy {
      cmd.arg("--proxy").arg(proxy);
    }
    cmd
  }

  async fn dump_json<T: DeserializeOwned>(
    &self,
    args: &[&str],
    url: &str,
  ) -> Result<T> {
    let mut cmd = self.command();
    cmd.args(args).arg("-J").arg("--no-warnings").arg(url);

    let guard = self.guard.acquire().await.context("yt-dlp guard closed")?;
    let output = cmd.output().await?;
    drop(guard);

    detect_error(&output.stderr)?;
    if !output.status.success() {
      return Err(Error::Extraction(format!(
        "yt-dlp exited with {} for {url}",
        output.status
      )));
    }

    Ok(serde_json::from_slice(&output.stdout)?)
  }
}

#[async_trait]
impl Extractor for Ytdlp {
  async fn info(&self, url: &str) -> Result<MediaInfo> {
    self.dump_json(&["--flat-playlist"], url).await
  }

  async fn formats(&self, url: &str) -> Result<Vec<FormatDescriptor>> {
    #[derive(Deserialize)]
    struct YtdlpOutput {
      #[serde(default)]
      formats: Vec<RawFormat>,
    }

    let output: YtdlpOutput = self.dump_json(&["--no-playlist"], url).await?;
    Ok(combined_formats(&output.formats))
  }

  async fn playlist(&self, url: &str) -> Result<Vec<String>> {
    let output: FlatPlaylist =
      self.dump_json(&["--flat-playlist"], url).await?;
    Ok(output.video_urls())
  }

  async fn download(
    &self,
    request: &DownloadRequest,
    dir: &Path,
    on_progress: OnProgress<'_>,
  ) -> Result<Artifact> {
    let args = download_args(request, dir)?;
    let mut cmd = self.command();
    cmd
      .args(args)
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());

    let guard = self.guard.acquire().await.context("yt-dlp guard closed")?;
    info!("downloading {}", request.url);

    let mut child = cmd.spawn()?;
    let stdout = child.stdout.take().context("stdout not captured")?;
    let stderr = child.stderr.take().context("stderr not captured")?;
    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();

    let mut report = Report::default();
    let (mut out_done, mut err_done) = (false, false);
    while !(out_done && err_done) {
      tokio::select! {
        line = out_lines.next_line(), if !out_done => match line? {
          Some(line) => report.feed(&line, on_progress),
          None => out_done = true,
        },
        line = err_lines.next_line(), if !err_done => match line? {
          Some(line) => report.feed(&line, on_progress),
          None => err_done = true,
        },
      }
    }

    let status = child.wait().await?;
    drop(guard);

    report.into_artifact(&request.url, status.success())
  }
}

fn download_args(request: &DownloadRequest, dir: &Path) -> Result<Vec<OsString>> {
  let options = &request.options;
  let mut args: Vec<OsString> = vec![
    "--no-playlist".into(),
    "--newline".into(),
    "--progress".into(),
    "--progress-template".into(),
    PROGRESS_TEMPLATE.into(),
    "--print".into(),
    format!("after_move:{FILEPATH_MARKER}%(filepath)s").into(),
    "--print".into(),
    format!("after_move:{TITLE_MARKER}%(title)s").into(),
    "--print".into(),
    format!("after_move:{HEIGHT_MARKER}%(height)s").into(),
    "-f".into(),
    options.selector()?.into(),
    "-o".into(),
    dir.join("%(title)s.%(ext)s").into_os_string(),
  ];

  if options.convert_to_mp3 {
    args.extend(["-x", "--audio-format", "mp3"].map(OsString::from));
  }

  args.push(request.url.clone().into());
  Ok(args)
}

/// What a download run told us on its output streams.
#[derive(Debug, Default)]
struct Report {
  filepath: Option<PathBuf>,
  title: Option<String>,
  height: Option<u32>,
  errors: Vec<String>,
}

impl Report {
  fn feed(&mut self, line: &str, on_progress: OnProgress<'_>) {
    if let Some(progress) = Progress::parse(line) {
      on_progress(progress);
    } else if let Some(path) = line.strip_prefix(FILEPATH_MARKER) {
      self.filepath = Some(PathBuf::from(path));
    } else if let Some(title) = line.strip_prefix(TITLE_MARKER) {
      self.title = Some(title.to_string()).filter(|t| t != "NA");
    } else if let Some(height) = line.strip_prefix(HEIGHT_MARKER) {
      self.height = height.trim().parse().ok();
    } else if line.starts_with("ERROR:") {
      warn!("{}", line);
      self.errors.push(line.to_string());
    } else {
      debug!("yt-dlp: {}", line);
    }
  }

  fn into_artifact(self, url: &str, success: bool) -> Result<Artifact> {
    if !self.errors.is_empty() {
      return Err(Error::Extraction(self.errors.join("\n")));
    }
    if !success {
      return Err(Error::Extraction(format!("yt-dlp failed for {url}")));
    }

    let path = self.filepath.ok_or_else(|| {
      Error::Extraction(format!("no output file reported for {url}"))
    })?;
    let file_name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .ok_or_else(|| {
        Error::Extraction(format!("invalid output path {}", path.display()))
      })?;

    Ok(Artifact {
      path,
      file_name,
      title: self.title,
      height: self.height,
    })
  }
}

#[derive(Debug, Deserialize)]
struct FlatPlaylist {
  #[serde(default)]
  entries: Vec<Option<FlatEntry>>,
  webpage_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
  url: Option<String>,
  webpage_url: Option<String>,
}

impl FlatPlaylist {
  // a plain video has no entries and stands for itself
  fn video_urls(self) -> Vec<String> {
    if self.entries.is_empty() {
      return self.webpage_url.into_iter().collect();
    }

    self
      .entries
      .into_iter()
      .flatten()
      .filter_map(|entry| entry.webpage_url.or(entry.url))
      .collect()
  }
}

fn detect_error(bytes: &[u8]) -> Result<()> {
  let s = String::from_utf8_lossy(bytes);
  let errors: Vec<&str> =
    s.lines().filter(|line| line.starts_with("ERROR:")).collect();

  if errors.is_empty() {
    Ok(())
  } else {
    Err(Error::Extraction(errors.join("\n")))
  }
}
