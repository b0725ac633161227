//! JSON Lines row source.
//!
//! [`JsonlSource`] streams a newline-delimited JSON file, one object per line,
//! and groups lines into [`RawRowGroup`]s on demand. Only the current group is
//! held in memory.
//!
//! # Notes
//! - Empty/whitespace-only lines are skipped.
//! - Every non-empty line must be a JSON object; anything else is a fatal
//!   read error carrying the line number.

use crate::features::FeatureSchema;
use crate::source::{RawRowGroup, RowSource};
use crate::value::{Record, record_from_json};
use anyhow::{Context, Result, anyhow};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// Streaming JSONL reader implementing [`RowSource`].
pub struct JsonlSource {
    path: PathBuf,
    features: FeatureSchema,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl JsonlSource {
    /// Open `path` for streaming with the caller-declared feature schema.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, features: FeatureSchema) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let f = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        Ok(Self {
            path,
            features,
            lines: BufReader::new(f).lines(),
            line_no: 0,
        })
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line
                .with_context(|| format!("read line {} in {}", self.line_no, self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let v: serde_json::Value = serde_json::from_str(&line).with_context(|| {
                format!("parse JSONL line {} in {}", self.line_no, self.path.display())
            })?;
            return record_from_json(v).map(Some).ok_or_else(|| {
                anyhow!(
                    "JSONL line {} in {} is not an object",
                    self.line_no,
                    self.path.display()
                )
            });
        }
        Ok(None)
    }
}

impl RowSource for JsonlSource {
    fn features(&self) -> &FeatureSchema {
        &self.features
    }

    fn next_group(&mut self, max_rows: usize) -> Result<Option<RawRowGroup>> {
        let mut records = Vec::with_capacity(max_rows.min(4096));
        while records.len() < max_rows.max(1) {
            match self.next_record()? {
                Some(r) => records.push(r),
                None => break,
            }
        }
        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(RawRowGroup::from_records(self.features.names(), &records)))
    }
}
