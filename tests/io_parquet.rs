#![cfg(feature = "io-parquet")]

use anyhow::{Result, bail};
use arrow::compute::concat_batches;
use nestflat::flatten::MEDIA_KIND_KEY;
use nestflat::io::parquet::list_parts;
use nestflat::testing::*;
use nestflat::{
    ConvertOptions, FeatureSchema, FeatureType, ParquetDatasetSink, Primitive, RawRowGroup, RowSource, VecSource,
    WriteMode, convert, read_parquet_dataset,
};
use serde_json::{Value as Json, json};

fn catalog() -> VecSource {
    VecSource::from_json(catalog_features(), catalog_rows())
}

fn expanded() -> ConvertOptions {
    ConvertOptions::default().with_expand_level(1).with_batch_size(3)
}

#[test]
fn parquet_dataset_roundtrip() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("catalog");
    let mut sink = ParquetDatasetSink::new(&dir);

    let outcome = convert(catalog(), &mut sink, &expanded())?;
    assert_eq!(outcome.rows(), 8);
    assert_eq!(list_parts(&dir)?.len(), 1);

    let batches = read_parquet_dataset(&dir)?;
    let schema = batches[0].schema();
    assert_field_names(
        &schema,
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
    let all = concat_batches(&schema, &batches)?;
    assert_eq!(all.num_rows(), 8);
    assert_column_eq(
        &all,
        "metadata_quality",
        &[json!(95), Json::Null, json!(99), json!(80), json!(92), json!(70), Json::Null, Json::Null],
    );
    assert_column_eq(
        &all,
        "items_item_id",
        &[
            json!(["a", "b"]),
            json!(["c"]),
            json!([]),
            Json::Null,
            json!(["d", null]),
            json!([null]),
            Json::Null,
            json!(["e"]),
        ],
    );
    Ok(())
}

#[test]
fn parquet_write_modes() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("ds");
    let mut sink = ParquetDatasetSink::new(&dir);

    convert(catalog(), &mut sink, &expanded())?;
    let err = convert(catalog(), &mut sink, &expanded()).expect_err("create refuses existing parts");
    assert!(format!("{err:#}").contains("already exists"), "{err:#}");

    convert(catalog(), &mut sink, &expanded().with_mode(WriteMode::Append))?;
    assert_eq!(list_parts(&dir)?.len(), 2);
    let rows: usize = read_parquet_dataset(&dir)?.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 16);

    convert(catalog(), &mut sink, &expanded().with_mode(WriteMode::Overwrite))?;
    let parts = list_parts(&dir)?;
    assert_eq!(parts.len(), 1);
    let rows: usize = read_parquet_dataset(&dir)?.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 8);
    Ok(())
}

struct Interrupted(VecSource, usize);

impl RowSource for Interrupted {
    fn features(&self) -> &FeatureSchema {
        self.0.features()
    }

    fn next_group(&mut self, max_rows: usize) -> Result<Option<RawRowGroup>> {
        if self.1 == 0 {
            bail!("row source interrupted");
        }
        self.1 -= 1;
        self.0.next_group(max_rows)
    }
}

#[test]
fn parquet_failed_overwrite_keeps_existing_parts() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("ds");
    let mut sink = ParquetDatasetSink::new(&dir);
    convert(catalog(), &mut sink, &expanded())?;
    let parts = list_parts(&dir)?;

    let failing = Interrupted(catalog(), 2);
    assert!(convert(failing, &mut sink, &expanded().with_mode(WriteMode::Overwrite)).is_err());

    assert_eq!(list_parts(&dir)?, parts);
    let rows: usize = read_parquet_dataset(&dir)?.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 8);
    Ok(())
}

#[test]
fn parquet_append_rejects_a_different_schema() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("ds");
    let mut sink = ParquetDatasetSink::new(&dir);
    convert(catalog(), &mut sink, &expanded())?;

    // Unexpanded, the same source has a different flat schema.
    let unexpanded = ConvertOptions::default().with_mode(WriteMode::Append);
    let err = convert(catalog(), &mut sink, &unexpanded).expect_err("schema differs");
    assert!(format!("{err:#}").contains("schema differs"), "{err:#}");
    assert_eq!(list_parts(&dir)?.len(), 1);
    Ok(())
}

#[test]
fn parquet_keeps_media_metadata_and_bytes() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("images");
    let rows = vec![
        json!({"image": {"bytes": [137, 80, 78, 71]}, "label": 1, "tags": [0]}),
        json!({"image": null, "label": 7, "tags": [1, 0]}),
    ];
    let source = VecSource::from_json(annotated_image_features(), rows);
    convert(source, &mut ParquetDatasetSink::new(&dir), &ConvertOptions::default())?;

    let batches = read_parquet_dataset(&dir)?;
    let image = batches[0].schema().field_with_name("image")?.clone();
    assert_eq!(image.metadata().get(MEDIA_KIND_KEY).map(String::as_str), Some("image"));
    assert_column_eq(&batches[0], "image", &[json!([137, 80, 78, 71]), Json::Null]);
    assert_column_eq(&batches[0], "label", &[json!("dog"), Json::Null]);
    assert_column_eq(&batches[0], "tags", &[json!(["indoor"]), json!(["outdoor", "indoor"])]);
    Ok(())
}

#[test]
fn parquet_empty_source_writes_nothing() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("empty");
    let features = FeatureSchema::new().with_field("x", FeatureType::Scalar(Primitive::Int64));
    let outcome = convert(
        VecSource::from_json(features, vec![]),
        &mut ParquetDatasetSink::new(&dir),
        &ConvertOptions::default(),
    )?;
    assert!(outcome.is_empty());
    assert!(!dir.exists());
    assert!(read_parquet_dataset(&dir)?.is_empty());
    Ok(())
}
