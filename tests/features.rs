use anyhow::Result;
use nestflat::features::MAX_NUM_CLASSES;
use nestflat::{FeatureSchema, FeatureType, MediaKind, Primitive, SchemaError};
use serde::Deserialize;
use serde_json::json;

fn scalar(p: Primitive) -> FeatureType {
    FeatureType::Scalar(p)
}

#[test]
fn from_json_tagged_shapes() -> Result<()> {
    let features = FeatureSchema::from_json(&json!({
        "image": {"_type": "Image"},
        "clip": {"_type": "Audio"},
        "label": {"_type": "ClassLabel", "names": ["cat", "dog"]},
        "grade": {"_type": "ClassLabel", "num_classes": 3},
        "scores": {"_type": "Sequence", "feature": {"_type": "Value", "dtype": "float32"}},
        "objects": {"_type": "List", "feature": {"bbox": {"_type": "Sequence", "feature": "float64"}, "category": "int64"}},
    }))?;

    assert_eq!(
        features.names().collect::<Vec<_>>(),
        ["image", "clip", "label", "grade", "scores", "objects"]
    );
    assert_eq!(features.get("image"), Some(&FeatureType::Media(MediaKind::Image)));
    assert_eq!(features.get("clip"), Some(&FeatureType::Media(MediaKind::Audio)));
    assert_eq!(features.get("label"), Some(&FeatureType::label(["cat", "dog"])));
    assert_eq!(features.get("grade"), Some(&FeatureType::label(["0", "1", "2"])));
    assert_eq!(
        features.get("scores"),
        Some(&FeatureType::sequence(scalar(Primitive::Float32)))
    );
    assert_eq!(
        features.get("objects"),
        Some(&FeatureType::sequence(FeatureType::structure([
            ("bbox", FeatureType::sequence(scalar(Primitive::Float64))),
            ("category", scalar(Primitive::Int64)),
        ])))
    );
    Ok(())
}

#[test]
fn from_json_plain_objects_are_structs() -> Result<()> {
    let features = FeatureSchema::from_json(&json!({
        "meta": {"source": "string", "quality": "int64"},
        "free_form": [],
    }))?;
    let meta = features.get("meta").and_then(FeatureType::struct_fields);
    let keys: Vec<&str> = meta.map(|m| m.keys().map(String::as_str).collect()).unwrap_or_default();
    assert_eq!(keys, ["quality", "source"]);
    assert_eq!(features.get("free_form"), Some(&FeatureType::Unknown));
    Ok(())
}

#[test]
fn from_json_keeps_unknown_dtype_for_later() -> Result<()> {
    let features = FeatureSchema::from_json(&json!({"t": "timestamp[s]"}))?;
    assert_eq!(
        features.get("t"),
        Some(&FeatureType::Scalar(Primitive::Other("timestamp[s]".into())))
    );
    Ok(())
}

#[test]
fn from_json_rejects_bad_declarations() {
    let cases = [
        (json!(["not", "an", "object"]), "<root>"),
        (json!({"x": {"_type": "Tensor"}}), "x"),
        (json!({"x": {"_type": "Value"}}), "x"),
        (json!({"x": {"_type": "Sequence"}}), "x"),
        (json!({"x": {"_type": "ClassLabel"}}), "x"),
        (json!({"meta": {"score": 3}}), "meta.score"),
    ];
    for (description, field) in cases {
        let err = FeatureSchema::from_json(&description).expect_err("declaration should be rejected");
        match err.downcast_ref::<SchemaError>() {
            Some(SchemaError::InvalidDeclaration { field: f, .. }) => assert_eq!(f, field),
            other => panic!("unexpected error for {description}: {other:?}"),
        }
    }
}

#[test]
fn from_json_bounds_num_classes() -> Result<()> {
    let too_many = json!({"grade": {"_type": "ClassLabel", "num_classes": MAX_NUM_CLASSES + 1}});
    let err = FeatureSchema::from_json(&too_many).expect_err("num_classes over the limit");
    assert!(matches!(
        err.downcast_ref::<SchemaError>(),
        Some(SchemaError::InvalidDeclaration { field, .. }) if field == "grade"
    ));

    let small = json!({"grade": {"_type": "ClassLabel", "num_classes": 16}});
    let features = FeatureSchema::from_json(&small)?;
    assert!(matches!(features.get("grade"), Some(FeatureType::Label(names)) if names.len() == 16));
    Ok(())
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct Meta {
    source: String,
    quality: Option<u32>,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct Row {
    id: i64,
    score: f64,
    tags: Vec<String>,
    meta: Meta,
}

#[test]
fn from_type_traces_rust_types() -> Result<()> {
    let features = FeatureSchema::from_type::<Row>()?;
    assert_eq!(features.names().collect::<Vec<_>>(), ["id", "score", "tags", "meta"]);
    assert_eq!(features.get("id"), Some(&scalar(Primitive::Int64)));
    assert_eq!(features.get("score"), Some(&scalar(Primitive::Float64)));
    assert!(matches!(
        features.get("tags"),
        Some(FeatureType::Sequence(inner))
            if matches!(inner.as_ref(), FeatureType::Scalar(Primitive::String | Primitive::LargeString))
    ));
    let meta = features.get("meta").and_then(FeatureType::struct_fields);
    assert_eq!(
        meta.and_then(|m| m.get("quality")),
        Some(&scalar(Primitive::UInt32))
    );
    assert!(features.get("meta").is_some_and(FeatureType::is_expandable));
    Ok(())
}

#[test]
fn feature_type_display_names_the_declaration() {
    assert_eq!(scalar(Primitive::Int64).to_string(), "Value(int64)");
    assert_eq!(
        FeatureType::sequence(FeatureType::label(["a"])).to_string(),
        "Sequence(ClassLabel(1 names))"
    );
    assert_eq!(
        FeatureType::structure([("b", FeatureType::Unknown), ("a", FeatureType::Unknown)]).to_string(),
        "Struct{a, b}"
    );
    assert_eq!(FeatureType::Media(MediaKind::Audio).to_string(), "Media(audio)");
}
