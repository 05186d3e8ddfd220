//! Error types for osim-pipeline
//!
//! Every variant names the trial, file or body it concerns so a failed batch
//! can be diagnosed from the log alone.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// osim-pipeline error types
#[derive(Error, Debug)]
pub enum Error {
    /// Expected output artifact never appeared within the allotted window
    #[error("{tool} for trial {trial} timed out after {elapsed_secs}s\nCheck status manually")]
    ToolTimedOut {
        /// Tool command token
        tool: String,
        /// Trial name
        trial: String,
        /// Seconds waited before giving up
        elapsed_secs: u64,
    },

    /// External tool reported failure (log marker or early exit)
    #[error("{tool} failed for trial {trial}: {reason}\nCheck status manually")]
    ToolFailed {
        /// Tool command token
        tool: String,
        /// Trial name
        trial: String,
        /// What gave the failure away
        reason: String,
    },

    /// Tool log exists but does not have the expected shape
    #[error("Log parse error: {0}")]
    LogParse(String),

    /// A body, tag or column referenced by configuration is absent
    #[error("Configuration mismatch: {item} not found in {source_name}")]
    ConfigMismatch {
        /// Missing body/tag/column
        item: String,
        /// Model, setup or table that should contain it
        source_name: String,
    },

    /// Simulation output could not be read as numbers
    #[error("Numeric parse error in {}: {detail}", file.display())]
    Numeric {
        /// Offending file
        file: PathBuf,
        /// Line and token detail
        detail: String,
    },

    /// XML read/write error
    #[error("XML error: {0}")]
    Xml(String),

    /// Invalid pipeline configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Storage error (table/Parquet)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration mismatch.
    pub fn mismatch(item: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self::ConfigMismatch {
            item: item.into(),
            source_name: source_name.into(),
        }
    }

    /// Shorthand for a numeric parse failure in `file`.
    pub fn numeric(file: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Numeric {
            file: file.into(),
            detail: detail.into(),
        }
    }

    /// True for timeouts and tool failures: the per-trial loop stops, siblings go on.
    #[must_use]
    pub const fn is_tool_outcome(&self) -> bool {
        matches!(self, Self::ToolTimedOut { .. } | Self::ToolFailed { .. })
    }

    /// True when a file the operation needed does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}
