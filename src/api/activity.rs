//! Activity-log endpoint and its filter criteria.

use chrono::{DateTime, NaiveDate};
use url::form_urlencoded;

use super::client::ApiClient;
use super::error::ApiError;
use super::types::ActivityLogEntry;

/// Page size used when paging without an explicit limit.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Query-shaping criteria for the activity log. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ActivityLogFilters {
  pub action: Option<String>,
  pub entity_type: Option<String>,
  /// ISO-8601 date or timestamp
  pub start_date: Option<String>,
  pub end_date: Option<String>,
  pub limit: Option<u32>,
  pub offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterParseError {
  #[error("unknown filter '{0}' (use action, entity, from, to, limit, offset)")]
  UnknownKey(String),
  #[error("expected key=value, got '{0}'")]
  MissingValue(String),
  #[error("{key} must be a number, got '{value}'")]
  InvalidNumber { key: String, value: String },
  #[error("{key} must be a date like 2024-01-31, got '{value}'")]
  InvalidDate { key: String, value: String },
}

impl ActivityLogFilters {
  /// Query parameters for the set filters, in a fixed order.
  ///
  /// Zero and empty values count as unset and are left out, matching what
  /// the backend has always received from the web client.
  pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    let mut push_str = |key: &'static str, value: &Option<String>| {
      if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        pairs.push((key, v.to_string()));
      }
    };
    push_str("action", &self.action);
    push_str("entityType", &self.entity_type);
    push_str("startDate", &self.start_date);
    push_str("endDate", &self.end_date);

    for (key, value) in [("limit", self.limit), ("offset", self.offset)] {
      if let Some(v) = value.filter(|v| *v != 0) {
        pairs.push((key, v.to_string()));
      }
    }
    pairs
  }

  /// URL-encoded query string, empty when no filter is set.
  pub fn to_query_string(&self) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in self.query_pairs() {
      serializer.append_pair(key, &value);
    }
    serializer.finish()
  }

  pub fn is_empty(&self) -> bool {
    self.query_pairs().is_empty()
  }

  /// Parse the filter prompt, e.g. `action=login entity=event from=2024-01-01 limit=20`.
  pub fn parse(input: &str) -> Result<Self, FilterParseError> {
    let mut filters = Self::default();

    for token in input.split_whitespace() {
      let (key, value) = token
        .split_once('=')
        .ok_or_else(|| FilterParseError::MissingValue(token.to_string()))?;
      let value = value.trim();

      match key.to_lowercase().as_str() {
        "action" => filters.action = Some(value.to_string()),
        "entity" | "entitytype" | "entity_type" => filters.entity_type = Some(value.to_string()),
        "from" | "start" | "startdate" => filters.start_date = Some(parse_date(key, value)?),
        "to" | "end" | "enddate" => filters.end_date = Some(parse_date(key, value)?),
        "limit" => filters.limit = Some(parse_number(key, value)?),
        "offset" => filters.offset = Some(parse_number(key, value)?),
        _ => return Err(FilterParseError::UnknownKey(key.to_string())),
      }
    }

    Ok(filters)
  }

  /// Prompt text that parses back into these filters.
  pub fn to_prompt(&self) -> String {
    let mut parts = Vec::new();
    for (key, value) in self.query_pairs() {
      let key = match key {
        "entityType" => "entity",
        "startDate" => "from",
        "endDate" => "to",
        other => other,
      };
      parts.push(format!("{}={}", key, value));
    }
    parts.join(" ")
  }

  pub fn page_size(&self) -> u32 {
    self.limit.filter(|l| *l != 0).unwrap_or(DEFAULT_PAGE_SIZE)
  }

  pub fn next_page(&self) -> Self {
    let size = self.page_size();
    Self {
      limit: Some(size),
      offset: Some(self.offset.unwrap_or(0).saturating_add(size)),
      ..self.clone()
    }
  }

  pub fn prev_page(&self) -> Self {
    let offset = self.offset.unwrap_or(0).saturating_sub(self.page_size());
    Self {
      offset: (offset > 0).then_some(offset),
      ..self.clone()
    }
  }
}

fn parse_number(key: &str, value: &str) -> Result<u32, FilterParseError> {
  value.parse().map_err(|_| FilterParseError::InvalidNumber {
    key: key.to_string(),
    value: value.to_string(),
  })
}

fn parse_date(key: &str, value: &str) -> Result<String, FilterParseError> {
  let valid = NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
    || DateTime::parse_from_rfc3339(value).is_ok();
  if valid {
    Ok(value.to_string())
  } else {
    Err(FilterParseError::InvalidDate {
      key: key.to_string(),
      value: value.to_string(),
    })
  }
}

impl ApiClient {
  /// Activity-log entries matching the filters, in backend order.
  pub async fn list_activity_logs(
    &self,
    filters: &ActivityLogFilters,
  ) -> Result<Vec<ActivityLogEntry>, ApiError> {
    let mut url = self.endpoint("activity-logs")?;
    let query = filters.to_query_string();
    if !query.is_empty() {
      url.set_query(Some(&query));
    }
    self.get_json(url).await
  }
}
