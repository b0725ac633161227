use anyhow::Result;
use arrow::datatypes::{DataType, Field, Fields};
use nestflat::flatten::{MEDIA_KIND_KEY, project};
use nestflat::testing::{annotated_image_features, assert_field_names, catalog_features, nested_features};
use nestflat::{FeatureSchema, FeatureType, Origin, Primitive, SchemaError, flatten};
use serde_json::json;

fn scalar(p: Primitive) -> FeatureType {
    FeatureType::Scalar(p)
}

#[test]
fn expands_struct_sub_fields_in_name_order() -> Result<()> {
    let features = FeatureSchema::new()
        .with_field("id", scalar(Primitive::Int64))
        .with_field(
            "meta",
            FeatureType::structure([
                ("zeta", scalar(Primitive::String)),
                ("alpha", scalar(Primitive::Bool)),
            ]),
        )
        .with_field("score", scalar(Primitive::Float64));

    let (flat, expansion) = flatten(&features, 1)?;
    assert_field_names(&flat.arrow_schema(), &["id", "meta_alpha", "meta_zeta", "score"]);

    assert_eq!(flat.column("meta_alpha").map(|c| &c.data_type), Some(&DataType::Boolean));
    assert_eq!(
        expansion.get("meta_zeta"),
        Some(&Origin::DictExpansion {
            field: "meta".into(),
            sub_field: "zeta".into()
        })
    );
    assert_eq!(expansion.len(), 2);
    assert!(!expansion.contains("id"));
    assert_eq!(
        flat.column("score").map(|c| &c.origin),
        Some(&Origin::Direct { field: "score".into() })
    );
    Ok(())
}

#[test]
fn expands_list_of_structs_into_list_columns() -> Result<()> {
    let (flat, expansion) = flatten(&catalog_features(), 1)?;
    assert_field_names(
        &flat.arrow_schema(),
        &[
            "id",
            "metadata_partner_id",
            "metadata_quality",
            "metadata_source",
            "items_item_id",
            "items_sub_items",
            "items_value",
        ],
    );

    let item_id = flat.column("items_item_id").expect("items_item_id");
    assert_eq!(item_id.data_type, DataType::new_list(DataType::Utf8, true));
    assert_eq!(
        item_id.origin,
        Origin::ListOfDictExpansion {
            field: "items".into(),
            sub_field: "item_id".into()
        }
    );
    assert_eq!(item_id.feature, FeatureType::sequence(scalar(Primitive::String)));

    // Only one level expands: the nested list of structs stays intact.
    let sub_items = flat.column("items_sub_items").expect("items_sub_items");
    let element = DataType::new_list(
        DataType::Struct(Fields::from(vec![Field::new("sub_id", DataType::Utf8, true)])),
        true,
    );
    assert_eq!(sub_items.data_type, DataType::new_list(element, true));
    assert_eq!(expansion.len(), 6);
    Ok(())
}

#[test]
fn expand_level_zero_keeps_nested_columns() -> Result<()> {
    let (flat, expansion) = flatten(&nested_features(), 0)?;
    assert!(expansion.is_empty());
    assert_field_names(&flat.arrow_schema(), &["nested"]);
    assert_eq!(
        flat.arrow_schema().field(0).data_type(),
        &DataType::Struct(Fields::from(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Utf8, true),
            Field::new("c", DataType::Boolean, true),
        ]))
    );
    Ok(())
}

#[test]
fn higher_expand_levels_still_expand_once() -> Result<()> {
    let (one, _) = flatten(&catalog_features(), 1)?;
    let (five, _) = flatten(&catalog_features(), 5)?;
    assert_eq!(one.arrow_schema(), five.arrow_schema());
    Ok(())
}

#[test]
fn projection_table() -> Result<()> {
    let (flat, _) = flatten(&annotated_image_features(), 1)?;
    let schema = flat.arrow_schema();

    let image = schema.field_with_name("image")?;
    assert_eq!(image.data_type(), &DataType::LargeBinary);
    assert_eq!(image.metadata().get(MEDIA_KIND_KEY).map(String::as_str), Some("image"));
    assert_eq!(schema.field_with_name("label")?.data_type(), &DataType::Utf8);
    assert!(schema.field_with_name("label")?.metadata().is_empty());
    assert_eq!(
        schema.field_with_name("tags")?.data_type(),
        &DataType::new_list(DataType::Utf8, true)
    );
    assert!(schema.fields().iter().all(|f| f.is_nullable()));

    assert_eq!(
        project("free", &FeatureType::Unknown)?,
        DataType::new_list(DataType::Null, true)
    );
    Ok(())
}

#[test]
fn unsupported_dtype_names_the_field_path() -> Result<()> {
    let features = FeatureSchema::from_json(&json!({
        "id": "int64",
        "meta": {"created": "timestamp[s]"},
    }))?;

    for level in [0, 1] {
        let err = flatten(&features, level).expect_err("timestamp is not supported");
        assert_eq!(
            err.downcast_ref::<SchemaError>(),
            Some(&SchemaError::UnsupportedFeature {
                field: "meta.created".into(),
                found: "Value(timestamp[s])".into(),
            })
        );
    }
    Ok(())
}

#[test]
fn name_collisions_are_configuration_errors() {
    let features = FeatureSchema::new()
        .with_field("a_b", scalar(Primitive::Int64))
        .with_field("a", FeatureType::structure([("b", scalar(Primitive::String))]));

    let err = flatten(&features, 1).expect_err("a_b collides");
    assert_eq!(
        err.downcast_ref::<SchemaError>(),
        Some(&SchemaError::DuplicateColumn { name: "a_b".into() })
    );
    // Without expansion there is nothing to collide.
    assert!(flatten(&features, 0).is_ok());
}

#[test]
fn empty_struct_expands_to_nothing() -> Result<()> {
    let features = FeatureSchema::new()
        .with_field("id", scalar(Primitive::Int32))
        .with_field("empty", FeatureType::Struct(Default::default()));
    let (flat, expansion) = flatten(&features, 1)?;
    assert_field_names(&flat.arrow_schema(), &["id"]);
    assert!(expansion.is_empty());
    Ok(())
}
