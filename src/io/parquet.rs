//! Parquet dataset sink.
//!
//! A dataset is a directory of `part-NNNNN.parquet` files that all share one
//! Arrow schema. Each conversion run streams its batches into a single new
//! part with `parquet::arrow::ArrowWriter`:
//!
//! - [`WriteMode::Create`] refuses a directory that already holds parts.
//! - [`WriteMode::Overwrite`] deletes existing parts once the new part is
//!   fully written.
//! - [`WriteMode::Append`] checks that the existing schema matches (field
//!   names and types) and adds the next part.
//!
//! [`read_parquet_dataset`] reads every part back in order.

use crate::config::WriteMode;
use crate::sink::BatchSink;
use anyhow::{Context, Result, bail};
use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const PART_PREFIX: &str = "part-";
const PART_SUFFIX: &str = ".parquet";

/// Directory-of-parts Parquet sink.
#[derive(Clone, Debug)]
pub struct ParquetDatasetSink {
    dir: PathBuf,
    props: WriterProperties,
}

impl ParquetDatasetSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            props: WriterProperties::builder().build(),
        }
    }

    #[must_use]
    pub fn with_properties(mut self, props: WriterProperties) -> Self {
        self.props = props;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_part_path(&self, existing: &[PathBuf]) -> PathBuf {
        let next = existing
            .iter()
            .filter_map(|p| part_index(p))
            .max()
            .map_or(0, |i| i + 1);
        self.dir.join(format!("{PART_PREFIX}{next:05}{PART_SUFFIX}"))
    }
}

impl BatchSink for ParquetDatasetSink {
    fn write(
        &mut self,
        schema: SchemaRef,
        batches: &mut dyn Iterator<Item = Result<RecordBatch>>,
        mode: WriteMode,
    ) -> Result<usize> {
        let existing = list_parts(&self.dir)?;
        match mode {
            WriteMode::Create if !existing.is_empty() => bail!(
                "dataset {} already exists; use append or overwrite",
                self.dir.display()
            ),
            WriteMode::Append => {
                if let Some(first) = existing.first() {
                    let found = read_part_schema(first)?;
                    if !same_columns(&found, &schema) {
                        bail!(
                            "cannot append to {}: schema differs from existing parts",
                            self.dir.display()
                        );
                    }
                }
            }
            WriteMode::Create | WriteMode::Overwrite => {}
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("mkdir -p {}", self.dir.display()))?;
        let path = self.next_part_path(&existing);
        match write_part(&path, schema, batches, self.props.clone()) {
            Ok(rows) => {
                // Old parts go only once the replacement is complete.
                if mode == WriteMode::Overwrite {
                    for p in &existing {
                        fs::remove_file(p).with_context(|| format!("remove {}", p.display()))?;
                    }
                }
                tracing::info!(path = %path.display(), rows, %mode, "wrote parquet part");
                Ok(rows)
            }
            Err(e) => {
                // Do not leave a truncated part behind.
                let _ = fs::remove_file(&path);
                Err(e)
            }
        }
    }
}

fn write_part(
    path: &Path,
    schema: SchemaRef,
    batches: &mut dyn Iterator<Item = Result<RecordBatch>>,
    props: WriterProperties,
) -> Result<usize> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props)).context("create ArrowWriter")?;
    let mut rows = 0;
    for batch in batches {
        let batch = batch?;
        rows += batch.num_rows();
        writer.write(&batch).context("write batch to parquet")?;
    }
    writer.close().context("close ArrowWriter")?;
    Ok(rows)
}

fn same_columns(a: &Schema, b: &Schema) -> bool {
    a.fields().len() == b.fields().len()
        && a.fields()
            .iter()
            .zip(b.fields().iter())
            .all(|(x, y)| x.name() == y.name() && x.data_type() == y.data_type())
}

fn part_index(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .strip_prefix(PART_PREFIX)?
        .strip_suffix(PART_SUFFIX)?
        .parse()
        .ok()
}

/// Sorted part files of a dataset directory. A missing directory has none.
///
/// # Errors
/// Returns an error if the directory exists but cannot be listed.
pub fn list_parts(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut parts: Vec<(usize, PathBuf)> = fs::read_dir(dir)
        .with_context(|| format!("list {}", dir.display()))?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            part_index(&path).map(|i| (i, path))
        })
        .collect();
    parts.sort_by_key(|(i, _)| *i);
    Ok(parts.into_iter().map(|(_, p)| p).collect())
}

fn read_part_schema(path: &Path) -> Result<SchemaRef> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("open ParquetRecordBatchReader")?;
    Ok(builder.schema().clone())
}

/// Read every part of a dataset directory, in part order.
///
/// # Errors
/// Returns an error if any part cannot be opened or decoded.
pub fn read_parquet_dataset(dir: impl AsRef<Path>) -> Result<Vec<RecordBatch>> {
    let mut out = Vec::new();
    for path in list_parts(dir)? {
        let file = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .context("open ParquetRecordBatchReader")?
            .build()
            .context("build ParquetRecordBatchReader")?;
        for batch in reader {
            out.push(batch.with_context(|| format!("read batch from {}", path.display()))?);
        }
    }
    Ok(out)
}
