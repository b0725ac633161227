//! # nestflat
//!
//! A **write-time flattening engine** that turns heterogeneous, nested,
//! dynamically-typed records into fixed-schema Arrow batches ready for
//! columnar storage.
//!
//! ## Key Features
//!
//! - **Declared schemas** - the output schema comes from feature metadata, not
//!   sampled rows, so every batch of a run carries the identical schema
//! - **One-level expansion** - structs and lists of structs become sibling
//!   columns (`{field}_{sub}`) under an explicit `expand_level`
//! - **Media and labels** - images/audio become large binary columns, label
//!   codes become their names
//! - **Graceful degradation** - irregular rows fall back to strings instead of
//!   aborting the conversion
//! - **Lazy, bounded memory** - one row group in flight at a time
//! - **I/O integrations** - JSON Lines sources and Parquet dataset sinks
//!   (optional via feature flags)
//!
//! ## Quick Start
//!
//! ```
//! use nestflat::*;
//! use serde_json::json;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let features = FeatureSchema::from_json(&json!({
//!     "id": "int64",
//!     "metadata": {"source": "string", "quality": "int64"},
//! }))?;
//!
//! let source = VecSource::from_json(features, vec![
//!     json!({"id": 1, "metadata": {"source": "web", "quality": 95}}),
//!     json!({"id": 2, "metadata": null}),
//! ]);
//!
//! let mut sink = MemorySink::new();
//! let outcome = convert(source, &mut sink, &ConvertOptions::default().with_expand_level(1))?;
//! assert_eq!(outcome.rows(), 2);
//!
//! let names: Vec<_> = sink.batches()[0].schema().fields().iter().map(|f| f.name().clone()).collect();
//! assert_eq!(names, ["id", "metadata_quality", "metadata_source"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Feature schema
//!
//! A [`FeatureSchema`] declares each top-level field as a [`FeatureType`]:
//! scalar, label, sequence, struct, media, or unknown. Build one by hand, from
//! a Hugging-Face-style JSON description, or by tracing a Rust type.
//!
//! ### Flattening
//!
//! [`flatten`] maps the declared schema to a [`FlatSchema`] and an
//! [`ExpansionMap`] once per run. Sub-fields are visited in name order, so the
//! column order is reproducible.
//!
//! ### Normalization
//!
//! [`normalize`] converts one column of raw [`Value`]s to the column's Arrow
//! type. When the values do not fit, it degrades to strings and reports it.
//!
//! ### Batches
//!
//! [`prepare`] returns either [`Prepared::Empty`] or a lazy [`Batches`]
//! iterator; [`convert`] drives it into any [`BatchSink`].
//!
//! ## Feature Flags
//!
//! - `io-jsonl` - JSON Lines row source
//! - `io-parquet` - Parquet dataset sink
//!
//! ## Module Overview
//!
//! - [`features`] - declared feature types and schemas
//! - [`flatten`] - flat schema and expansion map
//! - [`normalize`] - per-column value normalization
//! - [`source`] - row source contract and raw row groups
//! - [`batches`] - batch assembly
//! - [`sink`] - storage sink contract
//! - [`convert`] - end-to-end driver
//! - [`io`] - file-backed sources and sinks
//! - [`testing`] - fixtures and assertions for tests

pub mod batches;
pub mod config;
pub mod convert;
pub mod error;
pub mod features;
pub mod flatten;
pub mod io;
pub mod normalize;
pub mod sink;
pub mod source;
pub mod testing;
pub mod value;

// General re-exports
pub use batches::{BatchStats, Batches, Prepared, assemble, column_values, prepare};
pub use config::{ConvertOptions, DEFAULT_BATCH_SIZE, WriteMode};
pub use convert::{ConvertOutcome, convert};
pub use error::SchemaError;
pub use features::{FeatureSchema, FeatureType, MediaKind, Primitive};
pub use flatten::{ExpansionMap, FlatColumn, FlatSchema, Origin, flatten};
pub use normalize::{Normalized, build_typed, degrade_to_strings, normalize};
pub use sink::{BatchSink, MemorySink};
pub use source::{RawRowGroup, RowSource, VecSource};
pub use value::{Record, Value};

// Gated re-exports
#[cfg(feature = "io-jsonl")]
pub use io::jsonl::JsonlSource;

#[cfg(feature = "io-parquet")]
pub use io::parquet::{ParquetDatasetSink, read_parquet_dataset};
