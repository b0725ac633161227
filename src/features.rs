//! Feature Schema Model.
//!
//! A [`FeatureSchema`] is the declared shape of a source: an ordered list of
//! top-level fields, each described by a [`FeatureType`]. It is derived purely
//! from metadata (a JSON feature description, a Rust type, or a builder) and
//! never from row values, which is what keeps the flat schema identical for
//! every batch of a run.
//!
//! # Declaring a schema
//!
//! ```
//! use nestflat::{FeatureSchema, FeatureType, Primitive};
//! use serde_json::json;
//!
//! let from_builder = FeatureSchema::new()
//!     .with_field("id", FeatureType::Scalar(Primitive::Int64))
//!     .with_field("label", FeatureType::label(["cat", "dog"]));
//!
//! let from_json = FeatureSchema::from_json(&json!({
//!     "id": {"_type": "Value", "dtype": "int64"},
//!     "label": {"_type": "ClassLabel", "names": ["cat", "dog"]},
//! }))?;
//!
//! assert_eq!(from_builder, from_json);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::error::SchemaError;
use anyhow::{Context, Result};
use arrow::datatypes::{DataType, FieldRef};
use serde::Deserialize;
use serde_arrow::schema::{SchemaLike, TracingOptions};
use std::collections::BTreeMap;
use std::fmt;

/// Largest `num_classes` a `ClassLabel` declaration may ask for.
pub const MAX_NUM_CLASSES: u64 = 1 << 20;

/// Kind of binary media a column carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }
}

/// Scalar storage types a `Value` feature may declare.
///
/// Unrecognised dtype names are kept verbatim in [`Primitive::Other`] so the
/// declaration still loads; flattening rejects them with a named error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Null,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    LargeString,
    Binary,
    LargeBinary,
    Other(String),
}

impl Primitive {
    /// Parse a dtype name (`"int64"`, `"float"`, `"string"`, ...).
    #[must_use]
    pub fn from_dtype(dtype: &str) -> Self {
        match dtype {
            "null" => Self::Null,
            "bool" | "boolean" => Self::Bool,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint8" => Self::UInt8,
            "uint16" => Self::UInt16,
            "uint32" => Self::UInt32,
            "uint64" => Self::UInt64,
            "float" | "float32" => Self::Float32,
            "double" | "float64" => Self::Float64,
            "string" | "utf8" => Self::String,
            "large_string" | "large_utf8" => Self::LargeString,
            "binary" => Self::Binary,
            "large_binary" => Self::LargeBinary,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn dtype(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::LargeString => "large_string",
            Self::Binary => "binary",
            Self::LargeBinary => "large_binary",
            Self::Other(name) => name,
        }
    }

    /// The Arrow type this primitive is stored as, or `None` if unsupported.
    #[must_use]
    pub fn to_arrow(&self) -> Option<DataType> {
        Some(match self {
            Self::Null => DataType::Null,
            Self::Bool => DataType::Boolean,
            Self::Int8 => DataType::Int8,
            Self::Int16 => DataType::Int16,
            Self::Int32 => DataType::Int32,
            Self::Int64 => DataType::Int64,
            Self::UInt8 => DataType::UInt8,
            Self::UInt16 => DataType::UInt16,
            Self::UInt32 => DataType::UInt32,
            Self::UInt64 => DataType::UInt64,
            Self::Float32 => DataType::Float32,
            Self::Float64 => DataType::Float64,
            Self::String => DataType::Utf8,
            Self::LargeString => DataType::LargeUtf8,
            Self::Binary => DataType::Binary,
            Self::LargeBinary => DataType::LargeBinary,
            Self::Other(_) => return None,
        })
    }

    fn from_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Null => Self::Null,
            DataType::Boolean => Self::Bool,
            DataType::Int8 => Self::Int8,
            DataType::Int16 => Self::Int16,
            DataType::Int32 => Self::Int32,
            DataType::Int64 => Self::Int64,
            DataType::UInt8 => Self::UInt8,
            DataType::UInt16 => Self::UInt16,
            DataType::UInt32 => Self::UInt32,
            DataType::UInt64 => Self::UInt64,
            DataType::Float32 => Self::Float32,
            DataType::Float64 => Self::Float64,
            DataType::Utf8 => Self::String,
            DataType::LargeUtf8 => Self::LargeString,
            DataType::Binary => Self::Binary,
            DataType::LargeBinary => Self::LargeBinary,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Declared type of one field.
#[derive(Clone, Debug, PartialEq)]
pub enum FeatureType {
    Scalar(Primitive),
    /// Categorical label: integer codes index into the names.
    Label(Vec<String>),
    Sequence(Box<FeatureType>),
    /// Named sub-fields. Iteration is always in name order.
    Struct(BTreeMap<String, FeatureType>),
    Media(MediaKind),
    /// Ambiguous or dynamic content whose type cannot be known up front.
    Unknown,
}

impl FeatureType {
    pub fn label<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Label(names.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn sequence(element: Self) -> Self {
        Self::Sequence(Box::new(element))
    }

    pub fn structure<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Self)>,
        S: Into<String>,
    {
        Self::Struct(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Sub-fields of a `Struct`.
    #[must_use]
    pub const fn struct_fields(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// `Struct` and `Sequence(Struct)` are the only shapes that can expand.
    #[must_use]
    pub fn is_expandable(&self) -> bool {
        match self {
            Self::Struct(_) => true,
            Self::Sequence(inner) => matches!(inner.as_ref(), Self::Struct(_)),
            _ => false,
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(p) => write!(f, "Value({})", p.dtype()),
            Self::Label(names) => write!(f, "ClassLabel({} names)", names.len()),
            Self::Sequence(inner) => write!(f, "Sequence({inner})"),
            Self::Struct(fields) => {
                f.write_str("Struct{")?;
                for (i, name) in fields.keys().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(name)?;
                }
                f.write_str("}")
            }
            Self::Media(kind) => write!(f, "Media({})", kind.as_str()),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Ordered top-level field declarations of a source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureSchema {
    fields: Vec<(String, FeatureType)>,
}

impl FeatureSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, keeping declaration order.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, feature: FeatureType) -> Self {
        self.fields.push((name.into(), feature));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FeatureType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureType)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declare a schema from a Hugging-Face-style JSON feature description.
    ///
    /// Accepted shapes per field:
    /// - `{"_type": "Value", "dtype": "int64"}` or the bare string `"int64"`
    /// - `{"_type": "ClassLabel", "names": [...]}` (or `"num_classes": n`)
    /// - `{"_type": "Sequence", "feature": ...}` (`"List"` is an alias)
    /// - `{"_type": "Image"}` / `{"_type": "Audio"}`
    /// - a plain object without `_type`: a struct of its entries
    /// - a JSON array: an ambiguous list, declared [`FeatureType::Unknown`]
    ///
    /// # Errors
    /// Returns [`SchemaError::InvalidDeclaration`] if the top level is not an
    /// object, a `_type` tag is unknown, or a required key is missing.
    pub fn from_json(description: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(entries) = description else {
            return Err(SchemaError::InvalidDeclaration {
                field: "<root>".into(),
                reason: "feature description must be a JSON object".into(),
            }
            .into());
        };
        let mut schema = Self::new();
        for (name, v) in entries {
            schema.fields.push((name.clone(), parse_feature(name, v)?));
        }
        Ok(schema)
    }

    /// Declare a schema from a Rust type by tracing it with `serde_arrow`.
    ///
    /// Every traced Arrow field becomes a top-level feature: lists map to
    /// `Sequence`, structs to `Struct`, and scalar types to `Scalar`.
    ///
    /// # Errors
    /// Returns an error if `serde_arrow` cannot trace `T`.
    pub fn from_type<'de, T: Deserialize<'de>>() -> Result<Self> {
        let fields: Vec<FieldRef> = Vec::<FieldRef>::from_type::<T>(TracingOptions::default())
            .context("infer Arrow schema from type T")?;
        let mut schema = Self::new();
        for field in &fields {
            schema
                .fields
                .push((field.name().clone(), feature_from_arrow(field.data_type())));
        }
        Ok(schema)
    }
}

fn feature_from_arrow(data_type: &DataType) -> FeatureType {
    match data_type {
        DataType::List(item) | DataType::LargeList(item) => {
            FeatureType::sequence(feature_from_arrow(item.data_type()))
        }
        DataType::Struct(fields) => FeatureType::Struct(
            fields
                .iter()
                .map(|f| (f.name().clone(), feature_from_arrow(f.data_type())))
                .collect(),
        ),
        other => FeatureType::Scalar(Primitive::from_arrow(other)),
    }
}

fn parse_feature(path: &str, v: &serde_json::Value) -> Result<FeatureType> {
    let invalid = |reason: String| SchemaError::InvalidDeclaration {
        field: path.to_string(),
        reason,
    };
    match v {
        serde_json::Value::String(dtype) => Ok(FeatureType::Scalar(Primitive::from_dtype(dtype))),
        serde_json::Value::Array(_) => Ok(FeatureType::Unknown),
        serde_json::Value::Object(m) => {
            let Some(tag) = m.get("_type") else {
                let mut fields = BTreeMap::new();
                for (name, sub) in m {
                    fields.insert(name.clone(), parse_feature(&format!("{path}.{name}"), sub)?);
                }
                return Ok(FeatureType::Struct(fields));
            };
            match tag.as_str() {
                Some("Value") => {
                    let dtype = m
                        .get("dtype")
                        .and_then(serde_json::Value::as_str)
                        .ok_or_else(|| invalid("Value is missing a string `dtype`".into()))?;
                    Ok(FeatureType::Scalar(Primitive::from_dtype(dtype)))
                }
                Some("ClassLabel") => parse_class_label(m).map_err(|reason| invalid(reason).into()),
                Some("Sequence" | "List") => {
                    let inner = m
                        .get("feature")
                        .ok_or_else(|| invalid("Sequence is missing `feature`".into()))?;
                    Ok(FeatureType::sequence(parse_feature(path, inner)?))
                }
                Some("Image") => Ok(FeatureType::Media(MediaKind::Image)),
                Some("Audio") => Ok(FeatureType::Media(MediaKind::Audio)),
                Some(other) => Err(invalid(format!("unknown feature tag `{other}`")).into()),
                None => Err(invalid("`_type` must be a string".into()).into()),
            }
        }
        other => Err(invalid(format!("unexpected JSON {other}")).into()),
    }
}

fn parse_class_label(m: &serde_json::Map<String, serde_json::Value>) -> Result<FeatureType, String> {
    if let Some(names) = m.get("names").and_then(serde_json::Value::as_array) {
        return names
            .iter()
            .map(|n| n.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(FeatureType::Label)
            .ok_or_else(|| "ClassLabel `names` must all be strings".to_string());
    }
    let n = m
        .get("num_classes")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| "ClassLabel needs `names` (strings) or `num_classes`".to_string())?;
    if n > MAX_NUM_CLASSES {
        return Err(format!(
            "ClassLabel `num_classes` {n} exceeds the limit of {MAX_NUM_CLASSES}"
        ));
    }
    Ok(FeatureType::Label((0..n).map(|i| i.to_string()).collect()))
}
