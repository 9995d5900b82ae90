use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::query::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Event whose reminders are shown at startup
  pub default_event: Option<i64>,
  /// Custom title for header (defaults to the API host if not set)
  pub title: Option<String>,
  #[serde(default)]
  pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the backend API, e.g. https://events.example.com/api
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
  /// Total attempts for a failing read, including the first
  #[serde(default = "default_retry_attempts")]
  pub retry_attempts: u32,
  /// Delay before the first retry, doubled for each further one
  #[serde(default = "default_retry_delay_ms")]
  pub retry_delay_ms: u64,
  /// How long cached reads are served without refetching
  #[serde(default = "default_stale_secs")]
  pub stale_secs: u64,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self {
      retry_attempts: default_retry_attempts(),
      retry_delay_ms: default_retry_delay_ms(),
      stale_secs: default_stale_secs(),
    }
  }
}

fn default_retry_attempts() -> u32 {
  3
}

fn default_retry_delay_ms() -> u64 {
  1000
}

fn default_stale_secs() -> u64 {
  60
}

impl QueryConfig {
  pub fn retry_policy(&self) -> RetryPolicy {
    if self.retry_attempts <= 1 {
      return RetryPolicy::none();
    }
    RetryPolicy {
      max_attempts: self.retry_attempts,
      base_delay: Duration::from_millis(self.retry_delay_ms),
    }
  }

  pub fn stale_time(&self) -> Duration {
    Duration::from_secs(self.stale_secs)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./eventdesk.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/eventdesk/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/eventdesk/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("eventdesk.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("eventdesk").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub(crate) fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Get the API token from the environment, if one is set.
  ///
  /// Requests go out unauthenticated when EVENTDESK_API_TOKEN is absent.
  pub fn get_api_token() -> Option<String> {
    std::env::var("EVENTDESK_API_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }

  /// Directory for log files.
  pub fn log_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("eventdesk"))
  }

  /// Header title: configured title or the API host.
  pub fn display_title(&self) -> String {
    match &self.title {
      Some(t) => t.clone(),
      None => url::Url::parse(&self.api.base_url)
        .ok()
        .and_then(|u| u.host_str().map(String::from))
        .unwrap_or_else(|| self.api.base_url.clone()),
    }
  }
}
