//! Converter from materialized rows to Arrow record batches.
//!
//! Rows arrive row-major (a buffered result or a page); the converter
//! transposes them and builds one array per column.

use crate::error::ConversionError;
use crate::transport::ColumnDescriptor;
use crate::types::{Row, Value};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;

use super::builders::{arrow_type, build_array};

/// Converter for turning materialized rows into Arrow record batches.
#[derive(Debug, Clone)]
pub struct RowBatchConverter {
    schema: Arc<Schema>,
    columns: Vec<ColumnDescriptor>,
}

impl RowBatchConverter {
    /// Create a converter from the statement's column descriptors.
    ///
    /// # Arguments
    /// * `columns` - Column descriptors of the query
    pub fn new(columns: &[ColumnDescriptor]) -> Self {
        let fields: Vec<Field> = columns
            .iter()
            .map(|col| Field::new(&col.name, arrow_type(&col.native_type), true))
            .collect();

        Self {
            schema: Arc::new(Schema::new(fields)),
            columns: columns.to_vec(),
        }
    }

    /// Get the Arrow schema for this converter.
    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    /// Convert rows to an Arrow RecordBatch.
    ///
    /// # Arguments
    /// * `rows` - Materialized rows in column descriptor order
    ///
    /// # Errors
    /// Returns `ConversionError` if:
    /// - A row's width differs from the column count
    /// - A value does not match its column type
    /// - Arrow rejects the assembled batch
    pub fn convert(&self, rows: &[Row]) -> Result<RecordBatch, ConversionError> {
        let num_columns = self.columns.len();
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != num_columns {
                return Err(ConversionError::ColumnCountMismatch {
                    row: row_idx,
                    expected: num_columns,
                    actual: row.len(),
                });
            }
        }

        let arrays = self
            .columns
            .iter()
            .enumerate()
            .map(|(col_idx, col)| {
                let values: Vec<&Value> = rows.iter().map(|row| &row[col_idx]).collect();
                build_array(&col.native_type, &values, col_idx)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
        Ok(RecordBatch::try_new_with_options(
            Arc::clone(&self.schema),
            arrays,
            &options,
        )?)
    }
}
