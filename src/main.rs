mod api;
mod app;
mod cache;
mod commands;
mod config;
mod event;
mod query;
mod sync;
mod ui;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "eventdesk")]
#[command(about = "A terminal UI for speaker reminders and activity logs")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/eventdesk/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Event whose reminders to open
  #[arg(short, long)]
  event: Option<i64>,

  /// Override the API base URL from the config file
  #[arg(long)]
  api_url: Option<String>,
}

/// Log to a daily file; the terminal belongs to the UI.
fn init_logging() -> Result<WorkerGuard> {
  let dir = config::Config::log_dir()?;
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, "eventdesk.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_env("EVENTDESK_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging()?;

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line wins over the config file
  if let Some(event) = args.event {
    config.default_event = Some(event);
  }
  if let Some(url) = args.api_url {
    config.api.base_url = url;
  }

  tracing::info!(api = %config.api.base_url, "starting eventdesk");

  // Initialize and run the app
  let mut app = app::App::new(config)?;
  app.run().await?;

  Ok(())
}
