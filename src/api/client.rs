use crate::api::error::ApiError;
use crate::config::Config;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client for the event backend.
///
/// Resource calls live in `reminders.rs` and `activity.rs`; this type only
/// knows how to build URLs, attach credentials and turn responses into
/// typed results. It never retries.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: String,
  token: Option<String>,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    Self::with_base_url(
      &config.api.base_url,
      Config::get_api_token(),
      Duration::from_secs(config.api.timeout_secs),
    )
  }

  pub fn with_base_url(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
    Url::parse(base_url).map_err(|e| eyre!("Invalid API base URL {}: {}", base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("eventdesk/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
      token,
    })
  }

  /// Resolve a path like `reminders/failed` against the base URL.
  pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
    Url::parse(&raw).map_err(|e| ApiError::Transport(format!("bad url {}: {}", raw, e)))
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let builder = self.http.request(method, url);
    match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }

  pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
    debug!(%url, "GET");
    let response = self.request(Method::GET, url).send().await?;
    read_json(response).await
  }

  pub(crate) async fn post_json<T, B>(&self, url: Url, body: Option<&B>) -> Result<T, ApiError>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    debug!(%url, "POST");
    let mut builder = self.request(Method::POST, url);
    if let Some(body) = body {
      builder = builder.json(body);
    }
    let response = builder.send().await?;
    read_json(response).await
  }
}

/// Turn a response into `T`, keeping the body of non-2xx responses.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
  let status = response.status();
  let body = response.text().await?;

  if !status.is_success() {
    debug!(%status, "backend returned error status");
    return Err(ApiError::Status { status, body });
  }

  serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}
