//! Error types for bundle persistence.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or saving a bundle.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem I/O failed (reading or writing `bundle.json`, local files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `bundle.json` is malformed or could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The bundle directory does not contain a `bundle.json`.
    #[error("Bundle file not found: {0}")]
    BundleNotFound(Utf8PathBuf),

    /// The bundle was built in memory and has no directory to save into.
    #[error("Bundle '{0}' has no root directory")]
    NoRoot(String),

    /// A listing's local path escapes the bundle directory.
    #[error("Invalid local path in bundle listing: {0}")]
    InvalidLocalPath(Utf8PathBuf),
}
