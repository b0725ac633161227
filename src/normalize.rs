//! Value Normalizer.
//!
//! [`normalize`] turns one column of raw [`Value`]s into a single Arrow array
//! of the column's declared type. It works in two explicit steps:
//!
//! 1. **Resolve** every value against the declared feature: media become
//!    bytes (inline bytes, else the referenced file, else null), label codes
//!    become their names, and struct rows are rebuilt with exactly the target
//!    struct's sub-fields (extra keys dropped, missing keys null, non-mapping
//!    rows null). Resolution recurses through sequences.
//! 2. **Build** the typed array with [`build_typed`]. If the values do not fit
//!    the target type, the column degrades to strings via
//!    [`degrade_to_strings`] instead of failing.
//!
//! [`Normalized::conform`] then reconciles a degraded column with the flat
//! schema, nulling only the values that do not fit.
//!
//! Row-level irregularities never surface as errors from this module.

use crate::features::FeatureType;
use crate::value::{NULL, Record, Value};
use arrow::array::{
    Array, ArrayRef, BooleanBuilder, GenericBinaryBuilder, GenericListArray,
    GenericStringBuilder, NullArray, OffsetSizeTrait, PrimitiveBuilder, StringArray, StructArray,
    new_null_array,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::compute::cast;
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, FieldRef, Fields, Float32Type, Float64Type, Int8Type, Int16Type,
    Int32Type, Int64Type, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use arrow::error::ArrowError;
use std::collections::BTreeMap;
use std::sync::Arc;

static UNKNOWN: FeatureType = FeatureType::Unknown;

/// Output of [`normalize`] for one column.
#[derive(Clone, Debug)]
pub struct Normalized {
    pub array: ArrayRef,
    /// `true` when typed construction failed and the column fell back to
    /// strings.
    pub degraded: bool,
    /// Resolved values behind a degraded array; empty otherwise.
    resolved: Vec<Value>,
}

impl Normalized {
    /// Coerce the array to `target` so it fits the flat schema.
    ///
    /// Typed arrays and degraded string targets pass through. For list and
    /// struct targets the column is rebuilt from the resolved values with
    /// every leaf that does not fit replaced by null, so null rows stay null
    /// and list lengths are unchanged. Other scalar targets cast the degraded
    /// strings; values that do not parse become null.
    #[must_use]
    pub fn conform(self, target: &DataType) -> ArrayRef {
        if self.array.data_type() == target {
            return self.array;
        }
        let len = self.array.len();
        if self.degraded && is_nested(target) {
            let kept: Vec<Value> = self
                .resolved
                .iter()
                .map(|v| retain_fitting(v, target))
                .collect();
            return build_typed(&kept, target).unwrap_or_else(|_| new_null_array(target, len));
        }
        cast(&self.array, target).unwrap_or_else(|_| new_null_array(target, len))
    }
}

const fn is_nested(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::List(_) | DataType::LargeList(_) | DataType::Struct(_)
    )
}

/// Copy of `value` with every part that cannot be stored as `data_type`
/// replaced by null.
fn retain_fitting(value: &Value, data_type: &DataType) -> Value {
    match (value, data_type) {
        (Value::Null, _) => Value::Null,
        (Value::List(items), DataType::List(item) | DataType::LargeList(item)) => Value::List(
            items
                .iter()
                .map(|v| retain_fitting(v, item.data_type()))
                .collect(),
        ),
        (Value::Map(m), DataType::Struct(fields)) => Value::Map(
            fields
                .iter()
                .map(|f| {
                    let v = m
                        .get(f.name())
                        .map_or(Value::Null, |v| retain_fitting(v, f.data_type()));
                    (f.name().clone(), v)
                })
                .collect(),
        ),
        (_, target) if is_nested(target) => Value::Null,
        (v, leaf) => {
            if build(&[v], leaf).is_ok() {
                v.clone()
            } else {
                Value::Null
            }
        }
    }
}

/// Normalize one column of raw values to `target`.
///
/// `feature` is the declared feature for the values as they appear in the
/// column (after any origin projection).
#[must_use]
pub fn normalize(values: &[Value], feature: &FeatureType, target: &DataType) -> Normalized {
    let resolved: Vec<Value> = values.iter().map(|v| resolve(v, feature, target)).collect();
    match build_typed(&resolved, target) {
        Ok(array) => Normalized {
            array,
            degraded: false,
            resolved: Vec::new(),
        },
        Err(e) => {
            tracing::debug!(error = %e, data_type = %target, "typed construction failed, degrading to strings");
            Normalized {
                array: degrade_to_strings(&resolved),
                degraded: true,
                resolved,
            }
        }
    }
}

/// Last-resort representation: each value's display string, nulls kept.
#[must_use]
pub fn degrade_to_strings(values: &[Value]) -> ArrayRef {
    Arc::new(
        values
            .iter()
            .map(|v| (!v.is_null()).then(|| v.to_string()))
            .collect::<StringArray>(),
    )
}

/// Build an Arrow array of `data_type` directly from values.
///
/// Conversions are strict: integers must fit the target width, strings only
/// fill string columns, and lists/structs require lists/mappings.
///
/// # Errors
/// Returns an [`ArrowError`] naming the first value that does not fit, or for
/// target types this builder does not handle.
pub fn build_typed(values: &[Value], data_type: &DataType) -> Result<ArrayRef, ArrowError> {
    let refs: Vec<&Value> = values.iter().collect();
    build(&refs, data_type)
}

fn build(values: &[&Value], data_type: &DataType) -> Result<ArrayRef, ArrowError> {
    match data_type {
        DataType::Null => match values.iter().find(|v| !v.is_null()) {
            Some(v) => Err(mismatch(v, data_type)),
            None => Ok(Arc::new(NullArray::new(values.len()))),
        },
        DataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(values.len());
            for &v in values {
                match v {
                    Value::Null => builder.append_null(),
                    Value::Bool(b) => builder.append_value(*b),
                    other => return Err(mismatch(other, data_type)),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Int8 => primitive::<Int8Type>(values, data_type, int::<i8>),
        DataType::Int16 => primitive::<Int16Type>(values, data_type, int::<i16>),
        DataType::Int32 => primitive::<Int32Type>(values, data_type, int::<i32>),
        DataType::Int64 => primitive::<Int64Type>(values, data_type, int::<i64>),
        DataType::UInt8 => primitive::<UInt8Type>(values, data_type, int::<u8>),
        DataType::UInt16 => primitive::<UInt16Type>(values, data_type, int::<u16>),
        DataType::UInt32 => primitive::<UInt32Type>(values, data_type, int::<u32>),
        DataType::UInt64 => primitive::<UInt64Type>(values, data_type, int::<u64>),
        #[allow(clippy::cast_possible_truncation)]
        DataType::Float32 => {
            primitive::<Float32Type>(values, data_type, |v| float(v).map(|f| f as f32))
        }
        DataType::Float64 => primitive::<Float64Type>(values, data_type, float),
        DataType::Utf8 => strings::<i32>(values, data_type),
        DataType::LargeUtf8 => strings::<i64>(values, data_type),
        DataType::Binary => binaries::<i32>(values, data_type),
        DataType::LargeBinary => binaries::<i64>(values, data_type),
        DataType::List(item) => list::<i32>(values, item, data_type),
        DataType::LargeList(item) => list::<i64>(values, item, data_type),
        DataType::Struct(fields) => structure(values, fields, data_type),
        other => Err(ArrowError::NotYetImplemented(format!(
            "building {other} columns from raw values"
        ))),
    }
}

fn mismatch(value: &Value, data_type: &DataType) -> ArrowError {
    ArrowError::InvalidArgumentError(format!(
        "cannot store a {} value in a {data_type} column",
        value.kind()
    ))
}

fn int<N: TryFrom<i64> + TryFrom<u64>>(v: &Value) -> Option<N> {
    match v {
        Value::Int(i) => N::try_from(*i).ok(),
        Value::UInt(u) => N::try_from(*u).ok(),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn float(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::UInt(u) => Some(*u as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn primitive<T: ArrowPrimitiveType>(
    values: &[&Value],
    data_type: &DataType,
    convert: impl Fn(&Value) -> Option<T::Native>,
) -> Result<ArrayRef, ArrowError> {
    let mut builder = PrimitiveBuilder::<T>::with_capacity(values.len());
    for &v in values {
        if v.is_null() {
            builder.append_null();
            continue;
        }
        builder.append_value(convert(v).ok_or_else(|| mismatch(v, data_type))?);
    }
    Ok(Arc::new(builder.finish()))
}

fn strings<O: OffsetSizeTrait>(
    values: &[&Value],
    data_type: &DataType,
) -> Result<ArrayRef, ArrowError> {
    let mut builder = GenericStringBuilder::<O>::new();
    for &v in values {
        match v {
            Value::Null => builder.append_null(),
            Value::Str(s) => builder.append_value(s),
            other => return Err(mismatch(other, data_type)),
        }
    }
    Ok(Arc::new(builder.finish()))
}

fn binaries<O: OffsetSizeTrait>(
    values: &[&Value],
    data_type: &DataType,
) -> Result<ArrayRef, ArrowError> {
    let mut builder = GenericBinaryBuilder::<O>::new();
    for &v in values {
        match v {
            Value::Null => builder.append_null(),
            Value::Bytes(b) => builder.append_value(b),
            Value::Str(s) => builder.append_value(s.as_bytes()),
            other => return Err(mismatch(other, data_type)),
        }
    }
    Ok(Arc::new(builder.finish()))
}

fn list<O: OffsetSizeTrait>(
    values: &[&Value],
    item: &FieldRef,
    data_type: &DataType,
) -> Result<ArrayRef, ArrowError> {
    let mut lengths = Vec::with_capacity(values.len());
    let mut valid = Vec::with_capacity(values.len());
    let mut children: Vec<&Value> = Vec::new();
    for &v in values {
        match v {
            Value::Null => {
                lengths.push(0);
                valid.push(false);
            }
            Value::List(items) => {
                lengths.push(items.len());
                valid.push(true);
                children.extend(items.iter());
            }
            other => return Err(mismatch(other, data_type)),
        }
    }
    let child = build(&children, item.data_type())?;
    let array = GenericListArray::<O>::try_new(
        Arc::clone(item),
        OffsetBuffer::<O>::from_lengths(lengths),
        child,
        Some(NullBuffer::from(valid)),
    )?;
    Ok(Arc::new(array))
}

fn structure(
    values: &[&Value],
    fields: &Fields,
    data_type: &DataType,
) -> Result<ArrayRef, ArrowError> {
    let mut valid = Vec::with_capacity(values.len());
    for &v in values {
        match v {
            Value::Null => valid.push(false),
            Value::Map(_) => valid.push(true),
            other => return Err(mismatch(other, data_type)),
        }
    }
    let nulls = NullBuffer::from(valid);
    if fields.is_empty() {
        return Ok(Arc::new(StructArray::new_empty_fields(
            values.len(),
            Some(nulls),
        )));
    }
    let mut columns = Vec::with_capacity(fields.len());
    for field in fields.iter() {
        let child: Vec<&Value> = values
            .iter()
            .map(|v| v.get(field.name()).unwrap_or(&NULL))
            .collect();
        columns.push(build(&child, field.data_type())?);
    }
    Ok(Arc::new(StructArray::try_new(
        fields.clone(),
        columns,
        Some(nulls),
    )?))
}

fn resolve(value: &Value, feature: &FeatureType, target: &DataType) -> Value {
    match feature {
        FeatureType::Media(_) => resolve_media(value),
        FeatureType::Label(names) => resolve_label(value, names),
        FeatureType::Sequence(inner) => match (value, target) {
            (Value::List(items), DataType::List(item) | DataType::LargeList(item)) => Value::List(
                items
                    .iter()
                    .map(|v| resolve(v, inner, item.data_type()))
                    .collect(),
            ),
            _ => value.clone(),
        },
        FeatureType::Struct(subs) => match target {
            DataType::Struct(fields) => clean_record(value, subs, fields),
            _ => value.clone(),
        },
        FeatureType::Scalar(_) | FeatureType::Unknown => value.clone(),
    }
}

/// Rebuild a mapping with exactly the target's sub-fields.
fn clean_record(value: &Value, subs: &BTreeMap<String, FeatureType>, fields: &Fields) -> Value {
    let Value::Map(m) = value else {
        return Value::Null;
    };
    let clean: Record = fields
        .iter()
        .map(|f| {
            let name = f.name();
            let v = m.get(name).map_or(Value::Null, |v| {
                resolve(v, subs.get(name).unwrap_or(&UNKNOWN), f.data_type())
            });
            (name.clone(), v)
        })
        .collect();
    Value::Map(clean)
}

/// Inline bytes, then the referenced path, then null.
fn resolve_media(value: &Value) -> Value {
    match value {
        Value::Bytes(b) => Value::Bytes(b.clone()),
        Value::Map(m) => {
            if let Some(bytes) = m.get("bytes").and_then(inline_bytes)
                && !bytes.is_empty()
            {
                return Value::Bytes(bytes);
            }
            m.get("path")
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty())
                .and_then(|p| std::fs::read(p).ok())
                .map_or(Value::Null, Value::Bytes)
        }
        _ => Value::Null,
    }
}

/// Bytes held either natively or as a JSON-style array of octets.
fn inline_bytes(v: &Value) -> Option<Vec<u8>> {
    match v {
        Value::Bytes(b) => Some(b.clone()),
        Value::List(items) => items
            .iter()
            .map(|i| i.as_i64().and_then(|n| u8::try_from(n).ok()))
            .collect(),
        _ => None,
    }
}

fn resolve_label(value: &Value, names: &[String]) -> Value {
    let index = match value {
        Value::Int(i) => usize::try_from(*i).ok(),
        Value::UInt(u) => usize::try_from(*u).ok(),
        other => return other.clone(),
    };
    index
        .and_then(|i| names.get(i))
        .map_or(Value::Null, |name| Value::Str(name.clone()))
}
