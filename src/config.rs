//! Conversion options.
//!
//! ```
//! use nestflat::{ConvertOptions, WriteMode};
//!
//! let opts = ConvertOptions::default()
//!     .with_expand_level(1)
//!     .with_batch_size(256)
//!     .with_mode(WriteMode::Append);
//! assert_eq!(opts.effective_batch_size(), 256);
//!
//! let parsed: ConvertOptions = serde_json::from_str(r#"{"expand_level": 1, "mode": "overwrite"}"#)?;
//! assert_eq!(parsed.mode, WriteMode::Overwrite);
//! assert_eq!(parsed.effective_batch_size(), nestflat::DEFAULT_BATCH_SIZE);
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rows per batch when none is configured.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// How the storage sink treats existing output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Fail if output already exists.
    #[default]
    Create,
    /// Add to existing output with an identical schema.
    Append,
    /// Replace existing output.
    Overwrite,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Append => "append",
            Self::Overwrite => "overwrite",
        })
    }
}

impl FromStr for WriteMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "append" => Ok(Self::Append),
            "overwrite" => Ok(Self::Overwrite),
            other => bail!("unknown write mode '{other}' (expected create, append or overwrite)"),
        }
    }
}

/// Options for one conversion run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// `0` keeps nested fields as-is; any positive value expands one level.
    pub expand_level: usize,
    /// Rows per batch; `None` uses [`DEFAULT_BATCH_SIZE`].
    pub batch_size: Option<usize>,
    pub mode: WriteMode,
}

impl ConvertOptions {
    #[must_use]
    pub const fn with_expand_level(mut self, expand_level: usize) -> Self {
        self.expand_level = expand_level;
        self
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    /// # Errors
    /// Returns an error if `batch_size` is `Some(0)`.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == Some(0) {
            bail!("batch_size must be positive");
        }
        Ok(())
    }
}
