//! Typed failures produced by the resource clients and their classification.

use reqwest::StatusCode;

/// How a failure should be treated by retry and suppression policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// The backend does not expose this endpoint (HTTP 404)
  NotImplemented,
  /// Any other HTTP status, network or decoding failure
  Transient,
}

/// Failure of a single backend call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
  /// Backend answered with a non-2xx status
  #[error("HTTP {status}: {body}")]
  Status { status: StatusCode, body: String },

  /// Request never produced a response (connect, timeout, TLS...)
  #[error("request failed: {0}")]
  Transport(String),

  /// Response body did not match the expected shape
  #[error("invalid response: {0}")]
  Decode(String),
}

impl ApiError {
  /// Classify this failure. Both the read retry policy and the write
  /// suppression policy go through here.
  pub fn kind(&self) -> ErrorKind {
    match self {
      ApiError::Status { status, .. } if *status == StatusCode::NOT_FOUND => {
        ErrorKind::NotImplemented
      }
      _ => ErrorKind::Transient,
    }
  }

  pub fn is_not_implemented(&self) -> bool {
    self.kind() == ErrorKind::NotImplemented
  }

  /// Whether a read that failed this way is worth another attempt.
  pub fn is_retryable(&self) -> bool {
    self.kind() == ErrorKind::Transient
  }

  pub fn status(&self) -> Option<StatusCode> {
    match self {
      ApiError::Status { status, .. } => Some(*status),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      ApiError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
      ApiError::Status {
        status,
        body: String::new(),
      }
    } else {
      ApiError::Transport(err.to_string())
    }
  }
}
