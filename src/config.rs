//! Driver configuration.
//!
//! Settings shared by every call made through a [`Driver`](crate::Driver).
//! Per-call [`QueryOptions`](crate::query::QueryOptions) override the
//! defaults configured here.

use crate::error::ConfigError;
use crate::id::DEFAULT_ATTEMPTS;
use crate::query::ResultFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default capacity of a row stream's channel, in rows.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Driver-wide settings.
///
/// # Example
///
/// ```
/// use snowcursor_rs::config::DriverConfig;
///
/// let config = DriverConfig::from_json(r#"{"query_timeout_ms": 30000, "stream_buffer": 16}"#)
///     .unwrap();
/// assert_eq!(config.stream_buffer, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Result format used when a call does not choose one
    pub default_result_format: ResultFormat,
    /// Deadline for query calls, in milliseconds
    pub query_timeout_ms: Option<u64>,
    /// Deadline for connect calls, in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// Rows buffered between a stream's producer and its consumer
    pub stream_buffer: usize,
    /// Fresh identifiers tried before a handle allocation fails
    pub id_attempts: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            default_result_format: ResultFormat::Json,
            query_timeout_ms: None,
            connect_timeout_ms: None,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            id_attempts: DEFAULT_ATTEMPTS,
        }
    }
}

impl DriverConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` for malformed JSON and
    /// `ConfigError::InvalidValue` for out-of-range settings.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "stream_buffer".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.id_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "id_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Deadline for query calls.
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    /// Deadline for connect calls.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Set the default result format.
    pub fn with_result_format(mut self, format: ResultFormat) -> Self {
        self.default_result_format = format;
        self
    }

    /// Set the query deadline.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the connect deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the stream channel capacity.
    pub fn with_stream_buffer(mut self, rows: usize) -> Self {
        self.stream_buffer = rows;
        self
    }
}
