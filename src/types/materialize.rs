//! Row materialization.
//!
//! Converts one engine row into a [`Row`] of generic values. The null flag is
//! always checked before the declared type: a NULL cell is `Value::Null` for
//! every column type, including unsupported ones.

use crate::error::ConversionError;
use crate::transport::messages::{ColumnDescriptor, NativeType};
use serde_json::Value as JsonValue;

use super::value::{Row, Value};

/// Converts engine rows into generic rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultMaterializer;

impl ResultMaterializer {
    /// Create a materializer.
    pub fn new() -> Self {
        Self
    }

    /// Materialize one row.
    ///
    /// # Arguments
    /// * `columns` - Column descriptors of the statement
    /// * `cells` - Engine cells, one per column
    /// * `row` - Row index within the statement, for error reporting
    ///
    /// # Errors
    /// Returns `ConversionError` if the row width does not match the
    /// descriptors or a cell does not parse as its declared type.
    pub fn materialize(
        &self,
        columns: &[ColumnDescriptor],
        cells: &[JsonValue],
        row: usize,
    ) -> Result<Row, ConversionError> {
        if cells.len() != columns.len() {
            return Err(ConversionError::ColumnCountMismatch {
                row,
                expected: columns.len(),
                actual: cells.len(),
            });
        }

        columns
            .iter()
            .zip(cells)
            .enumerate()
            .map(|(column, (descriptor, cell))| self.materialize_cell(descriptor, cell, row, column))
            .collect()
    }

    fn materialize_cell(
        &self,
        descriptor: &ColumnDescriptor,
        cell: &JsonValue,
        row: usize,
        column: usize,
    ) -> Result<Value, ConversionError> {
        if cell.is_null() {
            return Ok(Value::Null);
        }

        match &descriptor.native_type {
            NativeType::Int64 => to_integer(cell, row, column).map(Value::Integer),
            NativeType::Float64 => to_float(cell, row, column).map(Value::Float),
            NativeType::String => Ok(Value::Text(to_text(cell))),
            unsupported => {
                if row == 0 {
                    tracing::warn!(
                        column = %descriptor.name,
                        native_type = %unsupported,
                        "Unsupported column type, value left unset"
                    );
                } else {
                    tracing::trace!(row, column, native_type = %unsupported, "Unsupported column type");
                }
                Ok(Value::Unsupported(unsupported.tag().to_string()))
            }
        }
    }
}

fn to_integer(cell: &JsonValue, row: usize, column: usize) -> Result<i32, ConversionError> {
    let wide = match cell {
        JsonValue::Number(n) => n.as_i64().ok_or_else(|| {
            if n.is_u64() {
                ConversionError::NumericOverflow { row, column }
            } else {
                ConversionError::InvalidValue {
                    row,
                    column,
                    message: format!("expected an integer, got {n}"),
                }
            }
        })?,
        JsonValue::String(s) => {
            s.trim()
                .parse::<i64>()
                .map_err(|_| ConversionError::InvalidValue {
                    row,
                    column,
                    message: format!("expected an integer, got '{s}'"),
                })?
        }
        other => {
            return Err(ConversionError::InvalidValue {
                row,
                column,
                message: format!("expected an integer, got {other}"),
            })
        }
    };

    i32::try_from(wide).map_err(|_| ConversionError::NumericOverflow { row, column })
}

fn to_float(cell: &JsonValue, row: usize, column: usize) -> Result<f64, ConversionError> {
    match cell {
        JsonValue::Number(n) => n.as_f64().ok_or_else(|| ConversionError::InvalidValue {
            row,
            column,
            message: format!("expected a float, got {n}"),
        }),
        JsonValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ConversionError::InvalidValue {
                row,
                column,
                message: format!("expected a float, got '{s}'"),
            }),
        other => Err(ConversionError::InvalidValue {
            row,
            column,
            message: format!("expected a float, got {other}"),
        }),
    }
}

fn to_text(cell: &JsonValue) -> String {
    match cell {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("ID", NativeType::Int64),
            ColumnDescriptor::new("PRICE", NativeType::Float64),
            ColumnDescriptor::new("NAME", NativeType::String),
        ]
    }

    #[test]
    fn test_typed_cells() {
        let row = ResultMaterializer::new()
            .materialize(&columns(), &[json!(42), json!(9.5), json!("widget")], 0)
            .unwrap();
        assert_eq!(
            row,
            vec![Value::Integer(42), Value::Float(9.5), Value::from("widget")]
        );
    }

    #[test]
    fn test_textual_cells() {
        let row = ResultMaterializer::new()
            .materialize(&columns(), &[json!(" -17 "), json!("1e3"), json!("7")], 0)
            .unwrap();
        assert_eq!(
            row,
            vec![Value::Integer(-17), Value::Float(1000.0), Value::from("7")]
        );
    }

    #[test]
    fn test_null_precedes_type_dispatch() {
        let columns = vec![
            ColumnDescriptor::new("ID", NativeType::Int64),
            ColumnDescriptor::new("PRICE", NativeType::Float64),
            ColumnDescriptor::new("NAME", NativeType::String),
            ColumnDescriptor::new("FLAG", NativeType::Boolean),
            ColumnDescriptor::new("DOC", NativeType::Other("VARIANT".to_string())),
        ];
        let cells = vec![JsonValue::Null; 5];
        let row = ResultMaterializer::new().materialize(&columns, &cells, 3).unwrap();
        assert!(row.iter().all(Value::is_null));
    }

    #[test]
    fn test_unsupported_type_is_not_coerced() {
        let columns = vec![
            ColumnDescriptor::new("ID", NativeType::Int64),
            ColumnDescriptor::new("FLAG", NativeType::Boolean),
            ColumnDescriptor::new("TS", NativeType::Timestamp),
        ];
        let row = ResultMaterializer::new()
            .materialize(&columns, &[json!("1"), json!(true), json!("1700000000.000")], 0)
            .unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(row[0], Value::Integer(1));
        assert_eq!(row[1], Value::Unsupported("BOOLEAN".to_string()));
        assert_eq!(row[2], Value::Unsupported("TIMESTAMP".to_string()));
    }

    #[test]
    fn test_integer_overflow() {
        let columns = vec![ColumnDescriptor::new("BIG", NativeType::Int64)];
        let err = ResultMaterializer::new()
            .materialize(&columns, &[json!("3000000000")], 4)
            .unwrap_err();
        assert_eq!(err, ConversionError::NumericOverflow { row: 4, column: 0 });

        let err = ResultMaterializer::new()
            .materialize(&columns, &[json!(u64::MAX)], 0)
            .unwrap_err();
        assert_eq!(err, ConversionError::NumericOverflow { row: 0, column: 0 });
    }

    #[test]
    fn test_invalid_cells() {
        let err = ResultMaterializer::new()
            .materialize(&columns(), &[json!("abc"), json!(1.0), json!("x")], 2)
            .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidValue { row: 2, column: 0, .. }));

        let err = ResultMaterializer::new()
            .materialize(&columns(), &[json!(1), json!(false), json!("x")], 0)
            .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidValue { column: 1, .. }));
    }

    #[test]
    fn test_column_count_mismatch() {
        let err = ResultMaterializer::new()
            .materialize(&columns(), &[json!(1)], 9)
            .unwrap_err();
        assert_eq!(
            err,
            ConversionError::ColumnCountMismatch {
                row: 9,
                expected: 3,
                actual: 1
            }
        );
    }
}
