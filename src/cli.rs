use std::{
  io::{IsTerminal, Write},
  sync::{Arc, Mutex},
};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::{
  config::{Config, ServeConfig},
  download::{requests_for, Batch, Downloader},
  extractor::Ytdlp,
  media::{
    parse_resolution, split_urls, DownloadOptions, DownloadRequest,
    QUALITY_OPTIONS,
  },
  progress::Progress,
  server::{self, AppState},
  Result,
};

#[derive(Parser, Debug)]
#[command(
  name = "tube-grab",
  version,
  about = "Download video or audio from video sites through yt-dlp"
)]
pub struct Cli {
  #[command(flatten)]
  pub config: Config,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Download one or more videos (URLs from arguments or stdin)
  Download(DownloadArgs),
  /// Download every video of a playlist
  Playlist {
    url: String,
    #[command(flatten)]
    options: OptionArgs,
  },
  /// List the video+audio formats available for a URL
  Formats { url: String },
  /// Show title and thumbnail of a URL
  Info { url: String },
  /// Run the HTTP service and its download page
  Serve(ServeConfig),
}

#[derive(Args, Debug, Clone)]
pub struct OptionArgs {
  /// Fetch the best audio-only stream
  #[arg(long)]
  pub audio_only: bool,

  /// Preferred resolution, falls back to the highest available
  #[arg(long, value_parser = resolution_arg)]
  pub resolution: Option<String>,

  /// Convert the result to mp3 (needs ffmpeg)
  #[arg(long)]
  pub mp3: bool,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
  pub urls: Vec<String>,

  #[command(flatten)]
  pub options: OptionArgs,

  /// Exact format id, see `formats`
  #[arg(long, conflicts_with = "audio_only")]
  pub format_id: Option<String>,

  /// Pick a format for every URL interactively
  #[arg(long, requires = "urls", conflicts_with_all = ["audio_only", "format_id"])]
  pub choose: bool,
}

fn resolution_arg(s: &str) -> Result<String, String> {
  parse_resolution(s)
    .map(|height| format!("{height}p"))
    .map_err(|_| format!("expected one of {}", QUALITY_OPTIONS.join(", ")))
}

impl OptionArgs {
  fn to_options(&self, format_id: Option<String>) -> DownloadOptions {
    DownloadOptions {
      audio_only: self.audio_only,
      resolution: self.resolution.clone(),
      format_id,
      convert_to_mp3: self.mp3,
    }
  }
}

impl Cli {
  pub async fn run(self) -> Result<()> {
    let extractor = Arc::new(Ytdlp::new(&self.config));
    let downloader = Downloader::new(extractor, &self.config.download_dir);

    match self.command {
      Command::Download(args) => download(&downloader, args).await,
      Command::Playlist { url, options } => {
        let line = ProgressLine::default();
        let batch = downloader
          .download_playlist(&url, &options.to_options(None), &line.callback())
          .await?;
        line.finish();
        summarize(batch)
      }
      Command::Formats { url } => formats(&downloader, &url).await,
      Command::Info { url } => {
        let info = downloader.extractor().info(url.trim()).await?;
        println!("{}", info.title.as_deref().unwrap_or("(untitled)"));
        if let Some(thumbnail) = info.thumbnail {
          println!("{thumbnail}");
        }
        Ok(())
      }
      Command::Serve(serve_config) => {
        info!("serving files from {}", downloader.dir().display());
        let state = AppState::new(downloader, serve_config.keep_files);
        server::serve(state, serve_config).await
      }
    }
  }
}

async fn download(downloader: &Downloader, args: DownloadArgs) -> Result<()> {
  let urls = if args.urls.is_empty() {
    read_urls().await?
  } else {
    args.urls.clone()
  };

  let requests = if args.choose {
    let mut requests = Vec::new();
    for url in urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
      let format_id = choose_format(downloader, url).await?;
      let options = args.options.to_options(format_id);
      requests.push(DownloadRequest::new(url, options));
    }
    requests
  } else {
    requests_for(&urls, &args.options.to_options(args.format_id.clone()))
  };

  println!("{} video(s) ready to download", requests.len());

  let line = ProgressLine::default();
  let batch = downloader.download_many(&requests, &line.callback()).await;
  line.finish();
  summarize(batch)
}

// paste URLs one per line, end with EOF
async fn read_urls() -> Result<Vec<String>> {
  if std::io::stdin().is_terminal() {
    eprintln!("Enter URLs (one per line), finish with Ctrl-D:");
  }

  let mut text = String::new();
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  while let Some(line) = lines.next_line().await? {
    text.push_str(&line);
    text.push('\n');
  }
  Ok(split_urls(&text))
}

async fn formats(downloader: &Downloader, url: &str) -> Result<()> {
  let formats = downloader.extractor().formats(url.trim()).await?;
  if formats.is_empty() {
    println!("ℹ️ Best quality");
    return Ok(());
  }

  let last = formats.len() - 1;
  for (i, format) in formats.iter().enumerate() {
    let marker = if i == last { "*" } else { " " };
    println!("{marker}[{i}] {:<8} {}", format.format_id, format.label());
  }
  Ok(())
}

async fn choose_format(
  downloader: &Downloader,
  url: &str,
) -> Result<Option<String>> {
  let formats = downloader.extractor().formats(url).await?;
  if formats.is_empty() {
    eprintln!("{url}: ℹ️ Best quality");
    return Ok(None);
  }

  eprintln!("{url}");
  for (i, format) in formats.iter().enumerate() {
    eprintln!("  [{i}] {}", format.label());
  }
  let last = formats.len() - 1;
  eprint!("Quality [{last}]: ");
  std::io::stderr().flush()?;

  let answer = tokio::task::spawn_blocking(|| {
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer).map(|_| answer)
  })
  .await
  .context("stdin reader stopped")??;

  let index = answer
    .trim()
    .parse::<usize>()
    .ok()
    .filter(|i| *i <= last)
    .unwrap_or(last);
  Ok(Some(formats[index].format_id.clone()))
}

fn summarize(batch: Batch) -> Result<()> {
  for artifact in &batch.saved {
    println!("✅ {}", artifact.path.display());
  }
  for (url, err) in &batch.failed {
    eprintln!("❌ {url}: {err}");
  }

  if batch.failed.is_empty() {
    println!("All downloads completed!");
    Ok(())
  } else {
    Err(anyhow::anyhow!("{} download(s) failed", batch.failed.len()).into())
  }
}

/// Single status line on stderr, redrawn on each update.
#[derive(Default)]
struct ProgressLine {
  // whether the cursor sits at the end of an unterminated status line
  open: Mutex<bool>,
}

impl ProgressLine {
  fn callback(&self) -> impl Fn(&str, Progress) + Send + Sync + '_ {
    move |_url, progress| self.update(progress)
  }

  fn update(&self, progress: Progress) {
    let Ok(mut open) = self.open.lock() else {
      return;
    };
    let percent = progress.ratio().map(|r| r * 100.0).unwrap_or(0.0);
    let mut stderr = std::io::stderr().lock();
    let _ = write!(stderr, "\r\x1b[2K{percent:5.1}% {progress}");
    if progress.finished {
      let _ = writeln!(stderr);
    }
    let _ = stderr.flush();
    *open = !progress.finished;
  }

  fn finish(&self) {
    if let Ok(mut open) = self.open.lock() {
      if *open {
        eprintln!();
      }
      *open = false;
    }
  }
}
