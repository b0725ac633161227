//! Assertion helpers for converted batches.
//!
//! Arrow arrays are read back as `serde_json::Value`s so expectations can be
//! written with `json!`. Binary values come back as arrays of octets, structs
//! as objects, lists as arrays, nulls as `null`.

use arrow::array::{Array, AsArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, Schema,
    UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use serde_json::{Value as Json, json};

/// Every slot of `array` as JSON.
#[must_use]
pub fn array_to_json(array: &dyn Array) -> Vec<Json> {
    (0..array.len()).map(|i| value_at(array, i)).collect()
}

/// The named column of `batch` as JSON.
///
/// # Panics
///
/// Panics if the batch has no column called `name`.
#[must_use]
pub fn column_json(batch: &RecordBatch, name: &str) -> Vec<Json> {
    let column = batch
        .column_by_name(name)
        .unwrap_or_else(|| panic!("no column '{name}' in batch schema {:?}", batch.schema()));
    array_to_json(column.as_ref())
}

/// Assert that a column reads back as `expected`, slot by slot.
///
/// # Panics
///
/// Panics if the column is missing, lengths differ, or any slot differs.
pub fn assert_column_eq(batch: &RecordBatch, name: &str, expected: &[Json]) {
    let actual = column_json(batch, name);
    assert_eq!(
        actual.len(),
        expected.len(),
        "Column '{name}' length mismatch:\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(
            a, e,
            "Column '{name}' mismatch at row {i}:\n  Expected: {e}\n  Actual: {a}\n  Full expected: {expected:?}\n  Full actual: {actual:?}"
        );
    }
}

/// Assert the exact, ordered field names of a schema.
///
/// # Panics
///
/// Panics if the names or their order differ.
pub fn assert_field_names(schema: &Schema, expected: &[&str]) {
    let actual: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(actual, expected, "Schema field names differ");
}

fn value_at(array: &dyn Array, i: usize) -> Json {
    if array.is_null(i) {
        return Json::Null;
    }
    match array.data_type() {
        DataType::Null => Json::Null,
        DataType::Boolean => Json::Bool(array.as_boolean().value(i)),
        DataType::Int8 => json!(array.as_primitive::<Int8Type>().value(i)),
        DataType::Int16 => json!(array.as_primitive::<Int16Type>().value(i)),
        DataType::Int32 => json!(array.as_primitive::<Int32Type>().value(i)),
        DataType::Int64 => json!(array.as_primitive::<Int64Type>().value(i)),
        DataType::UInt8 => json!(array.as_primitive::<UInt8Type>().value(i)),
        DataType::UInt16 => json!(array.as_primitive::<UInt16Type>().value(i)),
        DataType::UInt32 => json!(array.as_primitive::<UInt32Type>().value(i)),
        DataType::UInt64 => json!(array.as_primitive::<UInt64Type>().value(i)),
        DataType::Float32 => json!(f64::from(array.as_primitive::<Float32Type>().value(i))),
        DataType::Float64 => json!(array.as_primitive::<Float64Type>().value(i)),
        DataType::Utf8 => json!(array.as_string::<i32>().value(i)),
        DataType::LargeUtf8 => json!(array.as_string::<i64>().value(i)),
        DataType::Binary => json!(array.as_binary::<i32>().value(i)),
        DataType::LargeBinary => json!(array.as_binary::<i64>().value(i)),
        DataType::List(_) => Json::Array(array_to_json(array.as_list::<i32>().value(i).as_ref())),
        DataType::LargeList(_) => {
            Json::Array(array_to_json(array.as_list::<i64>().value(i).as_ref()))
        }
        DataType::Struct(fields) => {
            let s = array.as_struct();
            Json::Object(
                fields
                    .iter()
                    .zip(s.columns())
                    .map(|(f, c)| (f.name().clone(), value_at(c.as_ref(), i)))
                    .collect(),
            )
        }
        _ => Json::String(array_value_to_string(array, i).unwrap_or_default()),
    }
}
