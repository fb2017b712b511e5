//! Data shapes exchanged with the engine.
//!
//! Rows arrive in the engine's row-major JSON encoding: one `serde_json::Value`
//! per column, `null` for a NULL cell. Depending on the negotiated result
//! format a numeric cell is either a JSON number or its textual form.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row as delivered by the engine.
pub type EngineRow = Vec<serde_json::Value>;

/// Native type classification of a result column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NativeType {
    /// Fixed-point numbers with scale 0
    Int64,
    /// Floating point and scaled numbers
    Float64,
    /// Character data
    String,
    /// BOOLEAN
    Boolean,
    /// Any of the TIMESTAMP flavours and DATE/TIME
    Timestamp,
    /// BINARY / VARBINARY
    Binary,
    /// Anything else, carrying the engine's own tag
    Other(String),
}

impl NativeType {
    /// The engine-facing tag for this classification.
    pub fn tag(&self) -> &str {
        match self {
            NativeType::Int64 => "INT64",
            NativeType::Float64 => "FLOAT64",
            NativeType::String => "STRING",
            NativeType::Boolean => "BOOLEAN",
            NativeType::Timestamp => "TIMESTAMP",
            NativeType::Binary => "BINARY",
            NativeType::Other(tag) => tag,
        }
    }

    /// Check whether the materializer maps this classification to a value kind.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            NativeType::Int64 | NativeType::Float64 | NativeType::String
        )
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Column metadata reported by the engine for an executed statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,
    /// Native type classification
    pub native_type: NativeType,
    /// Whether the column may hold NULL
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDescriptor {
    /// Create a nullable column descriptor.
    pub fn new(name: impl Into<String>, native_type: NativeType) -> Self {
        Self {
            name: name.into(),
            native_type,
            nullable: true,
        }
    }

    /// Set nullability.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// Outcome of pulling a single row from a statement.
///
/// End of data and engine failure are separate variants so a cursor can tell
/// "five rows then done" apart from "failed after three rows".
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The next row
    Row(EngineRow),
    /// No further rows exist
    EndOfStream,
    /// The engine failed to produce the next row
    Error(EngineError),
}

impl FetchOutcome {
    /// Check if this is end of data.
    pub fn is_end(&self) -> bool {
        matches!(self, FetchOutcome::EndOfStream)
    }
}
