//! Error types for the backup engine.
//!
//! `EngineError` covers profile-fatal conditions: errors that abandon the
//! current profile's run. Transient per-file and per-operation failures are
//! logged through the run's `LogSink` and skipped, never surfaced here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that abandon a profile's backup run (or, for the configuration
/// variants, the whole run).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source root does not exist
    #[error("source directory not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// A path is structurally unusable for its role
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    /// Failed to list a directory's entries
    #[error("failed to enumerate directory {path}: {source}")]
    EnumerationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read from a source file
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to a destination file
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a destination directory
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to overwrite the index file at the end of a run
    #[error("failed to write index file {path}: {source}")]
    IndexWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The profile configuration file does not exist. Distinguishable from
    /// other failures so the caller can abort the whole run.
    #[error("profile configuration not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// The profile configuration file exists but could not be parsed
    #[error("failed to parse profile configuration {path}: {source}")]
    ConfigInvalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A profile record is missing required attributes
    #[error("missing profile attributes: {missing:?}")]
    MissingAttributes { missing: Vec<&'static str> },
}
