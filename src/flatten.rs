//! Schema Flattener.
//!
//! [`flatten`] turns a declared [`FeatureSchema`] into a [`FlatSchema`]: the
//! ordered, typed list of columns every batch of a run will carry. With
//! `expand_level > 0`, top-level `Struct` fields become one sibling column per
//! sub-field (`{field}_{sub}`), and top-level `Sequence(Struct)` fields become
//! one list column per sub-field. Only the outermost eligible level expands;
//! deeper structures are projected as-is.
//!
//! The result is computed once per run and treated as immutable afterwards.
//!
//! | Declared            | Arrow projection                      |
//! |---------------------|---------------------------------------|
//! | `Media`             | `LargeBinary` (+ `media_kind` metadata) |
//! | `Label`             | `Utf8`                                |
//! | `Scalar(p)`         | `p`'s Arrow type                      |
//! | `Struct`            | `Struct` of projected sub-fields, by name |
//! | `Sequence(t)`       | `List` of `t`'s projection            |
//! | `Unknown`           | `List<Null>` placeholder              |

use crate::error::SchemaError;
use crate::features::{FeatureSchema, FeatureType};
use anyhow::Result;
use arrow::datatypes::{DataType, Field, Fields, Schema, SchemaRef};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Field-metadata key recording the media kind of a binary column.
pub const MEDIA_KIND_KEY: &str = "media_kind";

/// How a flat column was derived from the declared schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The top-level field itself.
    Direct { field: String },
    /// One sub-field of a top-level struct.
    DictExpansion { field: String, sub_field: String },
    /// One sub-field of every element of a top-level list of structs.
    ListOfDictExpansion { field: String, sub_field: String },
}

impl Origin {
    /// The top-level source field this column reads from.
    #[must_use]
    pub fn source_field(&self) -> &str {
        match self {
            Self::Direct { field }
            | Self::DictExpansion { field, .. }
            | Self::ListOfDictExpansion { field, .. } => field,
        }
    }
}

/// One column of the flat output schema.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatColumn {
    pub name: String,
    pub data_type: DataType,
    pub origin: Origin,
    /// The declared feature describing this column's values after origin
    /// projection (a list-of-dict column sees `Sequence(sub_feature)`).
    pub feature: FeatureType,
}

/// The ordered flat columns of a run plus the Arrow schema they form.
#[derive(Clone, Debug)]
pub struct FlatSchema {
    columns: Vec<FlatColumn>,
    schema: SchemaRef,
}

impl FlatSchema {
    #[must_use]
    pub fn columns(&self) -> &[FlatColumn] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&FlatColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Shared Arrow schema handed to every batch and to the sink.
    #[must_use]
    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Expanded flat column name -> provenance. Direct columns have no entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpansionMap {
    entries: HashMap<String, Origin>,
}

impl ExpansionMap {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Origin> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Origin)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Compute the flat schema and expansion map for `schema`.
///
/// # Errors
/// - [`SchemaError::UnsupportedFeature`] if any column's declared type has no
///   Arrow projection; the error names the field path and the declared type.
/// - [`SchemaError::DuplicateColumn`] if two columns end up with one name.
pub fn flatten(schema: &FeatureSchema, expand_level: usize) -> Result<(FlatSchema, ExpansionMap)> {
    let mut columns = Vec::new();
    for (name, feature) in schema.iter() {
        let expansion = if expand_level > 0 {
            Expansion::of(feature)
        } else {
            None
        };
        match expansion {
            Some(Expansion::Dict(subs)) => {
                for (sub, sub_feature) in subs {
                    columns.push(FlatColumn {
                        name: format!("{name}_{sub}"),
                        data_type: project(&format!("{name}.{sub}"), sub_feature)?,
                        origin: Origin::DictExpansion {
                            field: name.to_string(),
                            sub_field: sub.clone(),
                        },
                        feature: sub_feature.clone(),
                    });
                }
            }
            Some(Expansion::ListOfDict(subs)) => {
                for (sub, sub_feature) in subs {
                    let element = project(&format!("{name}.{sub}"), sub_feature)?;
                    columns.push(FlatColumn {
                        name: format!("{name}_{sub}"),
                        data_type: DataType::new_list(element, true),
                        origin: Origin::ListOfDictExpansion {
                            field: name.to_string(),
                            sub_field: sub.clone(),
                        },
                        feature: FeatureType::sequence(sub_feature.clone()),
                    });
                }
            }
            None => columns.push(FlatColumn {
                name: name.to_string(),
                data_type: project(name, feature)?,
                origin: Origin::Direct {
                    field: name.to_string(),
                },
                feature: feature.clone(),
            }),
        }
    }

    let mut seen = HashSet::with_capacity(columns.len());
    for c in &columns {
        if !seen.insert(c.name.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                name: c.name.clone(),
            }
            .into());
        }
    }

    let fields: Vec<Field> = columns.iter().map(arrow_field).collect();
    let expansion = ExpansionMap {
        entries: columns
            .iter()
            .filter(|c| !matches!(c.origin, Origin::Direct { .. }))
            .map(|c| (c.name.clone(), c.origin.clone()))
            .collect(),
    };
    tracing::debug!(
        columns = columns.len(),
        expanded = expansion.len(),
        expand_level,
        "computed flat schema"
    );
    let flat = FlatSchema {
        columns,
        schema: Arc::new(Schema::new(fields)),
    };
    Ok((flat, expansion))
}

/// Arrow projection of a declared feature. `path` names the field in errors.
///
/// # Errors
/// Returns [`SchemaError::UnsupportedFeature`] for a scalar dtype with no
/// Arrow equivalent, wherever it is nested.
pub fn project(path: &str, feature: &FeatureType) -> Result<DataType> {
    Ok(match feature {
        FeatureType::Media(_) => DataType::LargeBinary,
        FeatureType::Label(_) => DataType::Utf8,
        FeatureType::Scalar(p) => p.to_arrow().ok_or_else(|| SchemaError::UnsupportedFeature {
            field: path.to_string(),
            found: feature.to_string(),
        })?,
        FeatureType::Struct(subs) => {
            let fields = subs
                .iter()
                .map(|(sub, f)| Ok(Field::new(sub, project(&format!("{path}.{sub}"), f)?, true)))
                .collect::<Result<Vec<_>>>()?;
            DataType::Struct(Fields::from(fields))
        }
        FeatureType::Sequence(inner) => DataType::new_list(project(path, inner)?, true),
        FeatureType::Unknown => DataType::new_list(DataType::Null, true),
    })
}

fn arrow_field(column: &FlatColumn) -> Field {
    let field = Field::new(&column.name, column.data_type.clone(), true);
    match &column.feature {
        FeatureType::Media(kind) => field.with_metadata(
            [(MEDIA_KIND_KEY.to_string(), kind.as_str().to_string())]
                .into_iter()
                .collect::<HashMap<_, _>>(),
        ),
        _ => field,
    }
}

enum Expansion<'a> {
    Dict(&'a BTreeMap<String, FeatureType>),
    ListOfDict(&'a BTreeMap<String, FeatureType>),
}

impl<'a> Expansion<'a> {
    fn of(feature: &'a FeatureType) -> Option<Self> {
        match feature {
            FeatureType::Struct(subs) => Some(Self::Dict(subs)),
            FeatureType::Sequence(inner) => inner.struct_fields().map(Self::ListOfDict),
            _ => None,
        }
    }
}
