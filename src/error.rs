//! Configuration errors raised while declaring or flattening a feature schema.
//!
//! These are fatal: they surface from [`crate::flatten`] and
//! [`FeatureSchema::from_json`](crate::FeatureSchema::from_json) before any
//! batch is produced. Row-level irregularities never produce a `SchemaError`.
//! The public APIs return `anyhow::Result`; callers that need to branch on the
//! category can `downcast_ref::<SchemaError>()`.

/// A problem with the declared schema or the flattening configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("unsupported feature type for column '{field}': {found}")]
    UnsupportedFeature { field: String, found: String },

    #[error("duplicate flat column name '{name}' after expansion")]
    DuplicateColumn { name: String },

    #[error("invalid feature declaration for '{field}': {reason}")]
    InvalidDeclaration { field: String, reason: String },
}
