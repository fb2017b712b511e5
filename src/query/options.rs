//! Per-call query and fetch options.

use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Encoding the engine uses for result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultFormat {
    /// Rows as JSON text; numbers arrive in their textual encoding
    #[default]
    #[serde(alias = "json")]
    Json,
    /// Rows as Arrow batches
    #[serde(alias = "arrow")]
    Arrow,
}

impl ResultFormat {
    /// Session directive selecting this format.
    ///
    /// The directive is issued on the statement that runs the query.
    pub fn directive(&self) -> &'static str {
        match self {
            ResultFormat::Json => "alter session set C_API_QUERY_RESULT_FORMAT=JSON",
            ResultFormat::Arrow => "alter session set C_API_QUERY_RESULT_FORMAT=ARROW_FORCE",
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultFormat::Json => "JSON",
            ResultFormat::Arrow => "ARROW",
        }
    }
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "JSON" => Ok(ResultFormat::Json),
            "ARROW" => Ok(ResultFormat::Arrow),
            _ => Err(QueryError::InvalidOption {
                option: "result_format".to_string(),
                message: format!("expected JSON or ARROW, got '{s}'"),
            }),
        }
    }
}

/// Options for one query call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Result encoding; `None` uses the driver's configured default
    pub result_format: Option<ResultFormat>,
    /// Deadline for the call; `None` uses the driver's configured default
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    /// Options with every setting left to the driver defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the result encoding.
    pub fn result_format(mut self, format: ResultFormat) -> Self {
        self.result_format = Some(format);
        self
    }

    /// Set a deadline for the call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for one fetch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Deadline for the call
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    /// Set a deadline for the call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
