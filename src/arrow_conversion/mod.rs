//! Arrow data format conversion utilities.
//!
//! This module turns materialized rows into Apache Arrow record batches for
//! callers that negotiated the ARROW result format.

mod builders;
mod converter;

pub use builders::{arrow_type, build_array};
pub use converter::RowBatchConverter;
