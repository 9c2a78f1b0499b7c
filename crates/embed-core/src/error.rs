use std::path::PathBuf;

use thiserror::Error;

/// Rejection of a raw amount before it reaches any resolution path.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum AmountError {
    #[error("amount must be a finite number, got {0}")]
    NotFinite(f64),

    #[error("amount must be greater than zero, got {0}")]
    NotPositive(f64),
}

/// Problems found while building a [`StatementCatalog`](crate::StatementCatalog).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("range {id}: min amount {min} exceeds max amount {max}")]
    InvertedRange { id: u32, min: f64, max: f64 },

    #[error("range {id}: bounds must be finite")]
    NonFiniteBound { id: u32 },

    #[error("range {id}: template is empty")]
    EmptyTemplate { id: u32 },

    #[error("duplicate range id {id}")]
    DuplicateId { id: u32 },
}

/// Errors raised while loading an [`EmbedConfig`](crate::EmbedConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
