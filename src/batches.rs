//! Batch Assembler.
//!
//! [`prepare`] flattens the declared schema once and peeks the first row
//! group. An empty source yields [`Prepared::Empty`]; otherwise the returned
//! [`Batches`] iterator lazily pulls one group at a time, projects each flat
//! column out of it by [`Origin`], normalizes it, and assembles a
//! `RecordBatch` with the precomputed schema. Nothing is buffered beyond the
//! group in flight, so callers can stop pulling at any point.
//!
//! ```
//! use nestflat::{ConvertOptions, FeatureSchema, FeatureType, Prepared, Primitive, VecSource, prepare};
//! use serde_json::json;
//!
//! let features = FeatureSchema::new().with_field(
//!     "meta",
//!     FeatureType::structure([("source", FeatureType::Scalar(Primitive::String))]),
//! );
//! let source = VecSource::from_json(features, vec![json!({"meta": {"source": "web"}})]);
//!
//! let Prepared::Ready(batches) = prepare(source, &ConvertOptions::default().with_expand_level(1))? else {
//!     unreachable!()
//! };
//! let batches = batches.collect::<anyhow::Result<Vec<_>>>()?;
//! assert_eq!(batches[0].schema().field(0).name(), "meta_source");
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::config::ConvertOptions;
use crate::flatten::{ExpansionMap, FlatColumn, FlatSchema, Origin, flatten};
use crate::normalize::normalize;
use crate::source::{RawRowGroup, RowSource};
use crate::value::Value;
use anyhow::{Context, Result};
use arrow::array::ArrayRef;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;

/// Result of the prepare phase.
pub enum Prepared<S> {
    /// The source produced no rows; nothing should be written.
    Empty { schema: SchemaRef },
    /// At least one row exists; pull batches from the iterator.
    Ready(Batches<S>),
}

impl<S> Prepared<S> {
    /// The flat schema, available in both outcomes.
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        match self {
            Self::Empty { schema } => Arc::clone(schema),
            Self::Ready(batches) => batches.schema(),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty { .. })
    }
}

/// Running totals for a conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchStats {
    pub batches: usize,
    pub rows: usize,
    /// Column arrays that fell back to strings, summed over all batches.
    pub degraded_columns: usize,
}

/// Lazy iterator of assembled batches.
pub struct Batches<S> {
    source: S,
    flat: Arc<FlatSchema>,
    expansion: Arc<ExpansionMap>,
    batch_size: usize,
    pending: Option<RawRowGroup>,
    stats: BatchStats,
    done: bool,
}

impl<S> Batches<S> {
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.flat.arrow_schema()
    }

    #[must_use]
    pub fn flat_schema(&self) -> &FlatSchema {
        &self.flat
    }

    #[must_use]
    pub fn expansion_map(&self) -> &ExpansionMap {
        &self.expansion
    }

    #[must_use]
    pub const fn stats(&self) -> BatchStats {
        self.stats
    }
}

/// Flatten the schema and peek the first non-empty row group.
///
/// # Errors
/// Returns an error if the options are invalid, the declared schema cannot be
/// flattened, or the source fails on its first read.
pub fn prepare<S: RowSource>(mut source: S, options: &ConvertOptions) -> Result<Prepared<S>> {
    options.validate()?;
    let (flat, expansion) =
        flatten(source.features(), options.expand_level).context("flatten feature schema")?;
    let batch_size = options.effective_batch_size();
    match next_non_empty(&mut source, batch_size)? {
        None => {
            tracing::warn!("row source is empty, nothing to write");
            Ok(Prepared::Empty {
                schema: flat.arrow_schema(),
            })
        }
        Some(first) => Ok(Prepared::Ready(Batches {
            source,
            flat: Arc::new(flat),
            expansion: Arc::new(expansion),
            batch_size,
            pending: Some(first),
            stats: BatchStats::default(),
            done: false,
        })),
    }
}

fn next_non_empty<S: RowSource>(source: &mut S, batch_size: usize) -> Result<Option<RawRowGroup>> {
    loop {
        match source.next_group(batch_size).context("read next row group")? {
            Some(group) if group.is_empty() => {}
            other => return Ok(other),
        }
    }
}

impl<S: RowSource> Iterator for Batches<S> {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let group = match self.pending.take() {
            Some(group) => group,
            None => match next_non_empty(&mut self.source, self.batch_size) {
                Ok(Some(group)) => group,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            },
        };
        let (batch, degraded) = match assemble(&group, &self.flat, &self.expansion) {
            Ok(out) => out,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        self.stats.batches += 1;
        self.stats.rows += batch.num_rows();
        self.stats.degraded_columns += degraded;
        tracing::debug!(
            batch = self.stats.batches,
            rows = batch.num_rows(),
            "assembled batch"
        );
        if degraded > 0 {
            tracing::warn!(
                batch = self.stats.batches,
                degraded,
                "columns degraded to strings and were reconciled to the declared types"
            );
        }
        Some(Ok(batch))
    }
}

/// Assemble one batch from a raw group.
///
/// Returns the batch and the number of columns that degraded.
///
/// # Errors
/// Returns an error only if the arrays cannot form a batch with the flat
/// schema, which indicates a bug rather than bad data.
pub fn assemble(
    group: &RawRowGroup,
    flat: &FlatSchema,
    expansion: &ExpansionMap,
) -> Result<(RecordBatch, usize)> {
    let mut degraded = 0;
    let arrays: Vec<ArrayRef> = flat
        .columns()
        .iter()
        .map(|column| {
            let values = column_values(group, column, expansion);
            let normalized = normalize(&values, &column.feature, &column.data_type);
            degraded += usize::from(normalized.degraded);
            normalized.conform(&column.data_type)
        })
        .collect();
    let options = RecordBatchOptions::new().with_row_count(Some(group.num_rows()));
    let batch = RecordBatch::try_new_with_options(flat.arrow_schema(), arrays, &options)
        .context("assemble record batch")?;
    Ok((batch, degraded))
}

/// Raw per-row values for one flat column.
///
/// Expanded columns are looked up in the expansion map; anything else reads
/// its own name directly. A missing source column reads as all-null.
#[must_use]
pub fn column_values(group: &RawRowGroup, column: &FlatColumn, expansion: &ExpansionMap) -> Vec<Value> {
    let n = group.num_rows();
    let origin = expansion.get(&column.name).unwrap_or(&column.origin);
    let Some(parent) = group.column(origin.source_field()) else {
        return vec![Value::Null; n];
    };
    match origin {
        Origin::Direct { .. } => parent.to_vec(),
        Origin::DictExpansion { sub_field, .. } => parent
            .iter()
            .map(|row| row.get(sub_field).cloned().unwrap_or_default())
            .collect(),
        Origin::ListOfDictExpansion { sub_field, .. } => parent
            .iter()
            .map(|row| match row {
                Value::List(items) => Value::List(
                    items
                        .iter()
                        .map(|item| item.get(sub_field).cloned().unwrap_or_default())
                        .collect(),
                ),
                _ => Value::Null,
            })
            .collect(),
    }
}
