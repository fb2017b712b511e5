//! Array builders for converting materialized values to Arrow arrays.
//!
//! Each builder takes one column of values, row-major input already
//! transposed, and produces an Arrow array with proper NULL handling.

use crate::error::ConversionError;
use crate::transport::NativeType;
use crate::types::Value;
use arrow::array::{ArrayRef, Float64Builder, Int32Builder, NullArray, StringBuilder};
use arrow::datatypes::DataType;
use std::sync::Arc;

/// Arrow type a native column is converted to.
///
/// Unsupported native types have no values and become `Null` columns.
pub fn arrow_type(native_type: &NativeType) -> DataType {
    match native_type {
        NativeType::Int64 => DataType::Int32,
        NativeType::Float64 => DataType::Float64,
        NativeType::String => DataType::Utf8,
        _ => DataType::Null,
    }
}

/// Build an Arrow array for one column.
///
/// # Arguments
/// * `native_type` - The column's engine type
/// * `values` - Column of values (one per row)
/// * `column` - Column index for error reporting
///
/// # Errors
/// Returns `ConversionError::InvalidValue` if a value does not match the
/// column type.
pub fn build_array(
    native_type: &NativeType,
    values: &[&Value],
    column: usize,
) -> Result<ArrayRef, ConversionError> {
    match native_type {
        NativeType::Int64 => build_int32_array(values, column),
        NativeType::Float64 => build_float64_array(values, column),
        NativeType::String => build_string_array(values, column),
        _ => Ok(Arc::new(NullArray::new(values.len()))),
    }
}

fn mismatch(value: &Value, expected: &str, row: usize, column: usize) -> ConversionError {
    ConversionError::InvalidValue {
        row,
        column,
        message: format!("expected {expected}, got {value:?}"),
    }
}

fn build_int32_array(values: &[&Value], column: usize) -> Result<ArrayRef, ConversionError> {
    let mut builder = Int32Builder::with_capacity(values.len());

    for (row, value) in values.iter().enumerate() {
        match value {
            Value::Null => builder.append_null(),
            Value::Integer(v) => builder.append_value(*v),
            other => return Err(mismatch(other, "an integer", row, column)),
        }
    }

    Ok(Arc::new(builder.finish()))
}

fn build_float64_array(values: &[&Value], column: usize) -> Result<ArrayRef, ConversionError> {
    let mut builder = Float64Builder::with_capacity(values.len());

    for (row, value) in values.iter().enumerate() {
        match value {
            Value::Null => builder.append_null(),
            Value::Float(v) => builder.append_value(*v),
            Value::Integer(v) => builder.append_value(f64::from(*v)),
            other => return Err(mismatch(other, "a float", row, column)),
        }
    }

    Ok(Arc::new(builder.finish()))
}

fn build_string_array(values: &[&Value], column: usize) -> Result<ArrayRef, ConversionError> {
    let estimated_bytes = values
        .iter()
        .map(|v| v.as_str().map_or(0, str::len))
        .sum();
    let mut builder = StringBuilder::with_capacity(values.len(), estimated_bytes);

    for (row, value) in values.iter().enumerate() {
        match value {
            Value::Null => builder.append_null(),
            Value::Text(v) => builder.append_value(v),
            other => return Err(mismatch(other, "text", row, column)),
        }
    }

    Ok(Arc::new(builder.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, Int32Array, StringArray};

    #[test]
    fn test_int32_with_nulls() {
        let values = [Value::Integer(1), Value::Null, Value::Integer(-3)];
        let refs: Vec<&Value> = values.iter().collect();
        let array = build_array(&NativeType::Int64, &refs, 0).unwrap();
        let array = array.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array.value(0), 1);
        assert!(array.is_null(1));
        assert_eq!(array.value(2), -3);
    }

    #[test]
    fn test_float64_widens_integers() {
        let values = [Value::Float(1.5), Value::Integer(2)];
        let refs: Vec<&Value> = values.iter().collect();
        let array = build_array(&NativeType::Float64, &refs, 0).unwrap();
        let array = array.as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(array.value(0), 1.5);
        assert_eq!(array.value(1), 2.0);
    }

    #[test]
    fn test_string_array() {
        let values = [Value::from("a"), Value::Null];
        let refs: Vec<&Value> = values.iter().collect();
        let array = build_array(&NativeType::String, &refs, 0).unwrap();
        let array = array.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(array.value(0), "a");
        assert!(array.is_null(1));
    }

    #[test]
    fn test_unsupported_becomes_null_array() {
        let values = [Value::Unsupported("BOOLEAN".to_string()), Value::Null];
        let refs: Vec<&Value> = values.iter().collect();
        let array = build_array(&NativeType::Boolean, &refs, 0).unwrap();
        assert_eq!(array.data_type(), &DataType::Null);
        assert_eq!(array.len(), 2);
    }

    #[test]
    fn test_type_mismatch() {
        let values = [Value::from("x")];
        let refs: Vec<&Value> = values.iter().collect();
        let err = build_array(&NativeType::Int64, &refs, 4).unwrap_err();
        assert!(matches!(err, ConversionError::InvalidValue { row: 0, column: 4, .. }));
    }
}
