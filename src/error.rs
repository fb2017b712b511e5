//! Error types for snowcursor-rs.
//!
//! This module defines domain-specific error types organized by functional area.
//! Engine failures keep the status code, SQL state and message reported by the
//! engine; nothing is collapsed into an absent value.

use std::fmt;
use thiserror::Error;

/// Top-level error type encompassing all possible errors.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Connection-related errors
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Query execution errors
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Errors while draining a statement
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Unknown handles and handle allocation failures
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Data conversion errors
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Driver configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Structured status reported by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("engine status {code}{}: {message}", sql_state_suffix(.sql_state))]
pub struct EngineError {
    /// Engine status / error code
    pub code: i32,
    /// Five-character SQL state, when the engine reports one
    pub sql_state: Option<String>,
    /// Diagnostic message
    pub message: String,
}

fn sql_state_suffix(sql_state: &Option<String>) -> String {
    sql_state
        .as_ref()
        .map(|state| format!(" ({state})"))
        .unwrap_or_default()
}

impl EngineError {
    /// Create an engine error without SQL state.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            sql_state: None,
            message: message.into(),
        }
    }

    /// Attach a SQL state.
    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }
}

/// Errors related to database connections.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The engine refused or could not open the session
    #[error("Failed to connect to account '{account}': {source}")]
    ConnectionFailed {
        account: String,
        #[source]
        source: EngineError,
    },

    /// The engine failed to terminate the session; the handle is gone regardless
    #[error("Failed to terminate connection '{connection_id}': {source}")]
    TerminateFailed {
        connection_id: String,
        #[source]
        source: EngineError,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Connection string parsing error
    #[error("Failed to parse connection string: {0}")]
    ParseError(String),

    /// Connection timeout
    #[error("Connection timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Errors related to query execution.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The result format directive or the query itself failed
    #[error("Query execution failed: {source}")]
    QueryFailed {
        sql: String,
        #[source]
        source: EngineError,
    },

    /// Unrecognized query option value
    #[error("Invalid query option '{option}': {message}")]
    InvalidOption { option: String, message: String },

    /// Query timeout
    #[error("Query timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Errors raised while pulling rows from a statement.
///
/// A real engine failure is never reported as end of results.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The engine failed mid-stream; the statement has been released
    #[error("Fetch failed after {rows_discarded} row(s) in the current page: {source}")]
    FetchFailed {
        rows_discarded: usize,
        #[source]
        source: EngineError,
    },

    /// Page size must be at least one row
    #[error("Invalid fetch size {0}: at least one row must be requested")]
    InvalidFetchSize(usize),

    /// Fetch timeout
    #[error("Fetch timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Errors related to connection and statement handles.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No live connection under this id
    #[error("Connection '{connection_id}' not found")]
    ConnectionNotFound { connection_id: String },

    /// No live detached statement under this key
    #[error("Statement '{statement_id}' on connection '{connection_id}' not found")]
    StatementNotFound {
        connection_id: String,
        statement_id: String,
    },

    /// Could not allocate a fresh identifier
    #[error("Could not generate a unique identifier after {attempts} attempts")]
    IdExhausted { attempts: usize },
}

/// Errors related to data type conversion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// Cell content does not match its declared type
    #[error("Invalid value at row {row}, column {column}: {message}")]
    InvalidValue {
        row: usize,
        column: usize,
        message: String,
    },

    /// Integer outside the 32-bit signed range
    #[error("Numeric overflow at row {row}, column {column}")]
    NumericOverflow { row: usize, column: usize },

    /// Row width differs from the column descriptors
    #[error("Row {row} has {actual} columns, expected {expected}")]
    ColumnCountMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// Arrow error
    #[error("Arrow error: {0}")]
    ArrowError(String),
}

/// Errors related to driver configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration document could not be parsed
    #[error("Failed to parse driver configuration: {0}")]
    ParseError(String),

    /// A setting is out of range
    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Error classification handed to the host call layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Connect failed
    ConnectionFailed,
    /// Directive or query failed
    QueryFailed,
    /// Engine failure while fetching
    FetchFailed,
    /// Unknown connection or statement id
    NotFound,
    /// Bad argument supplied by the caller
    InvalidArgument,
    /// Deadline expired
    Timeout,
    /// Value conversion failed
    Conversion,
    /// Driver-side resource exhausted, independent of the operation
    ResourceExhausted,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::ConnectionFailed => write!(f, "CONNECTION_FAILED"),
            ErrorCode::QueryFailed => write!(f, "QUERY_FAILED"),
            ErrorCode::FetchFailed => write!(f, "FETCH_FAILED"),
            ErrorCode::NotFound => write!(f, "NOT_FOUND"),
            ErrorCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            ErrorCode::Timeout => write!(f, "TIMEOUT"),
            ErrorCode::Conversion => write!(f, "CONVERSION"),
            ErrorCode::ResourceExhausted => write!(f, "RESOURCE_EXHAUSTED"),
        }
    }
}

impl DriverError {
    /// Map to the host-facing error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            DriverError::Connection(e) => e.code(),
            DriverError::Query(e) => e.code(),
            DriverError::Fetch(e) => e.code(),
            DriverError::Registry(RegistryError::IdExhausted { .. }) => ErrorCode::ResourceExhausted,
            DriverError::Registry(_) => ErrorCode::NotFound,
            DriverError::Conversion(_) => ErrorCode::Conversion,
            DriverError::Config(_) => ErrorCode::InvalidArgument,
        }
    }

    /// The engine status behind this error, if the engine produced it.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            DriverError::Connection(ConnectionError::ConnectionFailed { source, .. })
            | DriverError::Connection(ConnectionError::TerminateFailed { source, .. })
            | DriverError::Query(QueryError::QueryFailed { source, .. })
            | DriverError::Fetch(FetchError::FetchFailed { source, .. }) => Some(source),
            _ => None,
        }
    }

    /// Check whether this error reports an unknown handle.
    pub fn is_not_found(&self) -> bool {
        self.code() == ErrorCode::NotFound
    }
}

impl ConnectionError {
    /// Map to the host-facing error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            ConnectionError::ConnectionFailed { .. } | ConnectionError::TerminateFailed { .. } => {
                ErrorCode::ConnectionFailed
            }
            ConnectionError::Timeout { .. } => ErrorCode::Timeout,
            ConnectionError::InvalidParameter { .. } | ConnectionError::ParseError(_) => {
                ErrorCode::InvalidArgument
            }
        }
    }
}

impl QueryError {
    /// Map to the host-facing error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            QueryError::QueryFailed { .. } => ErrorCode::QueryFailed,
            QueryError::InvalidOption { .. } => ErrorCode::InvalidArgument,
            QueryError::Timeout { .. } => ErrorCode::Timeout,
        }
    }
}

impl FetchError {
    /// Map to the host-facing error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            FetchError::FetchFailed { .. } => ErrorCode::FetchFailed,
            FetchError::InvalidFetchSize(_) => ErrorCode::InvalidArgument,
            FetchError::Timeout { .. } => ErrorCode::Timeout,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for ConversionError {
    fn from(err: arrow::error::ArrowError) -> Self {
        ConversionError::ArrowError(err.to_string())
    }
}
