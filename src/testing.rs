//! Testing utilities for conversions.
//!
//! - **Fixtures**: declared schemas and matching raw rows for the nested
//!   shapes conversions most often meet (structs, lists of structs, labels)
//! - **Assertions**: read Arrow columns back as JSON and compare them
//!
//! # Quick Start
//!
//! ```
//! use nestflat::testing::*;
//! use nestflat::{ConvertOptions, MemorySink, VecSource, convert};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let source = VecSource::from_json(nested_features(), nested_rows());
//! let mut sink = MemorySink::new();
//! convert(source, &mut sink, &ConvertOptions::default().with_expand_level(1))?;
//!
//! let batch = &sink.batches()[0];
//! assert_column_eq(batch, "nested_a", &[json!(1), json!(2), json!(null), json!(null), json!(null)]);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
