//! Client for the event backend's reminder and activity-log endpoints.

pub mod activity;
pub mod client;
pub mod error;
mod reminders;
pub mod types;

pub use activity::{ActivityLogFilters, FilterParseError};
pub use client::ApiClient;
pub use error::{ApiError, ErrorKind};
