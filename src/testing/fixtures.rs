//! Pre-built declared schemas and raw rows for common nested shapes.

use crate::features::{FeatureSchema, FeatureType, MediaKind, Primitive};
use crate::value::{Record, record_from_json};
use anyhow::{Context, Result};
use serde_json::{Value as Json, json};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

fn scalar(p: Primitive) -> FeatureType {
    FeatureType::Scalar(p)
}

/// A single struct field `nested {a: int64, b: string, c: bool}`.
#[must_use]
pub fn nested_features() -> FeatureSchema {
    FeatureSchema::new().with_field(
        "nested",
        FeatureType::structure([
            ("a", scalar(Primitive::Int64)),
            ("b", scalar(Primitive::String)),
            ("c", scalar(Primitive::Bool)),
        ]),
    )
}

/// Rows for [`nested_features`] with extra keys, empty maps, missing fields
/// and explicit nulls.
#[must_use]
pub fn nested_rows() -> Vec<Json> {
    vec![
        json!({"nested": {"a": 1, "b": "one"}}),
        json!({"nested": {"a": 2, "b": "two", "c": true}}),
        json!({"nested": {}}),
        json!({}),
        json!({"nested": {"a": null, "b": "four"}}),
    ]
}

/// A catalog entry: an id, a metadata struct, and a list of item structs whose
/// items carry their own nested list of structs.
#[must_use]
pub fn catalog_features() -> FeatureSchema {
    FeatureSchema::new()
        .with_field("id", scalar(Primitive::Int64))
        .with_field(
            "metadata",
            FeatureType::structure([
                ("source", scalar(Primitive::String)),
                ("quality", scalar(Primitive::Int64)),
                ("partner_id", scalar(Primitive::Int64)),
            ]),
        )
        .with_field(
            "items",
            FeatureType::sequence(FeatureType::structure([
                ("item_id", scalar(Primitive::String)),
                ("value", scalar(Primitive::Float64)),
                (
                    "sub_items",
                    FeatureType::sequence(FeatureType::structure([(
                        "sub_id",
                        scalar(Primitive::String),
                    )])),
                ),
            ])),
        )
}

/// Eight catalog rows covering regular data, null structs, empty and null
/// lists, list elements with missing keys, and a second nesting level.
#[must_use]
pub fn catalog_rows() -> Vec<Json> {
    vec![
        json!({"id": 1, "metadata": {"source": "web", "quality": 95},
               "items": [{"item_id": "a", "value": 1.0}, {"item_id": "b", "value": 2.0}]}),
        json!({"id": 2, "metadata": null, "items": [{"item_id": "c", "value": 3.0}]}),
        json!({"id": 3, "metadata": {"source": "internal", "quality": 99}, "items": []}),
        json!({"id": 4, "metadata": {"source": "web", "quality": 80}, "items": null}),
        json!({"id": 5, "metadata": {"source": "partner", "quality": 92, "partner_id": 123},
               "items": [{"item_id": "d"}, {"value": 5.0}]}),
        json!({"id": 6, "metadata": {"source": "web", "quality": 70}, "items": [{}]}),
        json!({"id": 7, "metadata": null, "items": null}),
        json!({"id": 8, "metadata": {"source": "test"},
               "items": [{"item_id": "e", "value": 6.0,
                          "sub_items": [{"sub_id": "x"}, {"sub_id": "y"}]}]}),
    ]
}

/// An annotated image record: media, a class label and a list of labels.
#[must_use]
pub fn annotated_image_features() -> FeatureSchema {
    FeatureSchema::new()
        .with_field("image", FeatureType::Media(MediaKind::Image))
        .with_field("label", FeatureType::label(["cat", "dog", "bird"]))
        .with_field(
            "tags",
            FeatureType::sequence(FeatureType::label(["indoor", "outdoor"])),
        )
}

/// Convert JSON rows into records; non-object rows become empty records.
#[must_use]
pub fn records(rows: Vec<Json>) -> Vec<Record> {
    rows.into_iter()
        .map(|r| record_from_json(r).unwrap_or_default())
        .collect()
}

/// Write `rows` as JSON Lines into a fresh temporary directory.
///
/// Returns the directory guard (keep it alive while the file is in use) and
/// the file path.
///
/// # Errors
/// Returns an error if the temporary directory or file cannot be written.
pub fn jsonl_file(rows: &[Json]) -> Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("rows.jsonl");
    let mut file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
    for row in rows {
        writeln!(file, "{row}")?;
    }
    Ok((dir, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_rows_shape() {
        let rows = records(nested_rows());
        assert_eq!(rows.len(), 5);
        assert!(rows[3].is_empty());
    }

    #[test]
    fn test_catalog_features_expandable() {
        let features = catalog_features();
        assert_eq!(features.len(), 3);
        assert!(features.get("metadata").is_some_and(FeatureType::is_expandable));
        assert!(features.get("items").is_some_and(FeatureType::is_expandable));
        assert!(!features.get("id").is_some_and(FeatureType::is_expandable));
    }

    #[test]
    fn test_catalog_rows_cover_null_lists() {
        let rows = records(catalog_rows());
        assert_eq!(rows.len(), 8);
        assert!(rows[3].get("items").is_some_and(crate::Value::is_null));
    }

    #[test]
    fn test_jsonl_file_one_line_per_row() -> Result<()> {
        let (_dir, path) = jsonl_file(&nested_rows())?;
        let text = std::fs::read_to_string(path)?;
        assert_eq!(text.lines().count(), 5);
        Ok(())
    }
}
