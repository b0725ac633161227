//! End-to-end conversion: row source -> flat batches -> storage sink.

use crate::batches::{BatchStats, Prepared, prepare};
use crate::config::ConvertOptions;
use crate::sink::BatchSink;
use crate::source::RowSource;
use anyhow::{Context, Result};

/// What a conversion run did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvertOutcome {
    /// The source had no rows; the sink was not touched.
    Empty,
    Written(BatchStats),
}

impl ConvertOutcome {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Written(stats) => stats.rows,
        }
    }
}

/// Convert everything `source` yields and write it to `sink`.
///
/// # Errors
/// Returns an error for configuration problems (invalid options, an
/// unflattenable schema), unreadable sources, or sink failures.
pub fn convert<S, K>(source: S, sink: &mut K, options: &ConvertOptions) -> Result<ConvertOutcome>
where
    S: RowSource,
    K: BatchSink + ?Sized,
{
    let mut batches = match prepare(source, options)? {
        Prepared::Empty { .. } => return Ok(ConvertOutcome::Empty),
        Prepared::Ready(batches) => batches,
    };
    let schema = batches.schema();
    let rows = sink
        .write(schema, &mut batches, options.mode)
        .with_context(|| format!("write batches (mode {})", options.mode))?;
    let stats = batches.stats();
    tracing::info!(
        rows,
        batches = stats.batches,
        degraded_columns = stats.degraded_columns,
        "conversion finished"
    );
    Ok(ConvertOutcome::Written(stats))
}
