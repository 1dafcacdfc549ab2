use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod download;
mod error;
mod extractor;
mod formats;
mod media;
mod progress;
mod server;
mod util;

pub use error::{Error, Result};

#[tokio::main]
async fn main() -> ExitCode {
  init_tracing();

  let cli = cli::Cli::parse();
  match cli.run().await {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("tube-grab error: {err}");
      ExitCode::FAILURE
    }
  }
}

fn init_tracing() {
  let env_filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new("info,tube_grab=info"));

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr)
    .init();
}
