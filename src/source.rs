//! Row source contract and raw row groups.
//!
//! A [`RowSource`] exposes its declared [`FeatureSchema`] up front and then
//! hands out column-oriented [`RawRowGroup`]s on demand. Sources are pulled,
//! never pushed: the engine asks for the next group only after the previous
//! batch has been handed off.

use crate::features::FeatureSchema;
use crate::value::{Record, Value};
use anyhow::{Result, ensure};
use std::collections::HashMap;

/// Column-oriented view of up to `batch_size` source rows.
///
/// Every column holds exactly [`num_rows`](Self::num_rows) values. A field
/// that no row carried may be absent entirely; readers treat that as all-null.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawRowGroup {
    num_rows: usize,
    columns: HashMap<String, Vec<Value>>,
}

impl RawRowGroup {
    #[must_use]
    pub fn new(num_rows: usize) -> Self {
        Self {
            num_rows,
            columns: HashMap::new(),
        }
    }

    /// Add a column; its length must equal the group's row count.
    ///
    /// # Errors
    /// Returns an error if `values.len() != num_rows`.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<()> {
        let name = name.into();
        ensure!(
            values.len() == self.num_rows,
            "column '{name}' has {} values, expected {}",
            values.len(),
            self.num_rows
        );
        self.columns.insert(name, values);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    ///
    /// # Errors
    /// Returns an error if `values.len() != num_rows`.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Value>) -> Result<Self> {
        self.insert(name, values)?;
        Ok(self)
    }

    /// Pivot row-oriented records into columns for the given fields.
    ///
    /// Keys a record lacks become null; keys outside `fields` are dropped.
    pub fn from_records<'a>(fields: impl IntoIterator<Item = &'a str>, records: &[Record]) -> Self {
        let columns = fields
            .into_iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|r| r.get(name).cloned().unwrap_or_default())
                    .collect();
                (name.to_string(), values)
            })
            .collect();
        Self {
            num_rows: records.len(),
            columns,
        }
    }

    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

/// A pull-based producer of raw row groups.
pub trait RowSource {
    /// Declared feature schema, available before any row is read.
    fn features(&self) -> &FeatureSchema;

    /// The next group of at most `max_rows` rows, or `None` when exhausted.
    ///
    /// # Errors
    /// Returns an error if the underlying data cannot be read at all.
    fn next_group(&mut self, max_rows: usize) -> Result<Option<RawRowGroup>>;
}

impl<S: RowSource + ?Sized> RowSource for &mut S {
    fn features(&self) -> &FeatureSchema {
        (**self).features()
    }

    fn next_group(&mut self, max_rows: usize) -> Result<Option<RawRowGroup>> {
        (**self).next_group(max_rows)
    }
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn features(&self) -> &FeatureSchema {
        (**self).features()
    }

    fn next_group(&mut self, max_rows: usize) -> Result<Option<RawRowGroup>> {
        (**self).next_group(max_rows)
    }
}

/// In-memory row source over owned records.
#[derive(Clone, Debug)]
pub struct VecSource {
    features: FeatureSchema,
    records: std::vec::IntoIter<Record>,
}

impl VecSource {
    #[must_use]
    pub fn new(features: FeatureSchema, records: Vec<Record>) -> Self {
        Self {
            features,
            records: records.into_iter(),
        }
    }

    /// Build from JSON rows; non-object rows become empty records.
    #[must_use]
    pub fn from_json(features: FeatureSchema, rows: Vec<serde_json::Value>) -> Self {
        let records = rows
            .into_iter()
            .map(|r| crate::value::record_from_json(r).unwrap_or_default())
            .collect();
        Self::new(features, records)
    }
}

impl RowSource for VecSource {
    fn features(&self) -> &FeatureSchema {
        &self.features
    }

    fn next_group(&mut self, max_rows: usize) -> Result<Option<RawRowGroup>> {
        let chunk: Vec<Record> = self.records.by_ref().take(max_rows.max(1)).collect();
        if chunk.is_empty() {
            return Ok(None);
        }
        Ok(Some(RawRowGroup::from_records(self.features.names(), &chunk)))
    }
}
