//! Storage sink contract.
//!
//! A sink receives the flat schema once and then a lazy stream of batches that
//! all conform to it. Durability and layout are entirely the sink's concern.

use crate::config::WriteMode;
use anyhow::{Result, bail, ensure};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

/// Destination for converted batches.
pub trait BatchSink {
    /// Consume `batches` under `mode`. Returns the number of rows written.
    ///
    /// # Errors
    /// Returns an error if the mode is not satisfiable for the existing
    /// output, any batch is an error, or the underlying write fails.
    fn write(
        &mut self,
        schema: SchemaRef,
        batches: &mut dyn Iterator<Item = Result<RecordBatch>>,
        mode: WriteMode,
    ) -> Result<usize>;
}

/// Keeps batches in memory; handy for tests and in-process consumers.
#[derive(Debug, Default)]
pub struct MemorySink {
    schema: Option<SchemaRef>,
    batches: Vec<RecordBatch>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    #[must_use]
    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }
}

impl BatchSink for MemorySink {
    fn write(
        &mut self,
        schema: SchemaRef,
        batches: &mut dyn Iterator<Item = Result<RecordBatch>>,
        mode: WriteMode,
    ) -> Result<usize> {
        match (mode, &self.schema) {
            (WriteMode::Create, Some(_)) => bail!("memory sink already holds data"),
            (WriteMode::Append, Some(existing)) => ensure!(
                existing.fields() == schema.fields(),
                "cannot append: schema differs from existing data"
            ),
            _ => {}
        }
        // Nothing is committed until the whole stream has been read.
        let incoming = batches.collect::<Result<Vec<_>>>()?;
        let rows = incoming.iter().map(RecordBatch::num_rows).sum();
        if mode == WriteMode::Overwrite {
            self.batches = incoming;
        } else {
            self.batches.extend(incoming);
        }
        self.schema = Some(schema);
        Ok(rows)
    }
}
