//! Error types for patch application.
//!
//! [`diff`](crate::diff) is infallible. [`apply`](crate::apply) fails only when a
//! patch is malformed, which usually means a stored bundle was edited by hand or
//! written by an incompatible tool.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while applying a patch.
///
/// Every variant carries the JSON-pointer-style path of the offending node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A mapping key starting with a single `$` that is not a known directive.
    #[error("Unknown patch directive '{directive}' at '{path}'")]
    UnknownDirective { path: String, directive: String },

    /// A `$delete` marker used anywhere other than as a mapping entry.
    #[error("'$delete' is only valid as a mapping entry (at '{path}')")]
    MisplacedDelete { path: String },

    /// A `$array` directive without a valid length or item table.
    #[error("Malformed array patch at '{path}': {reason}")]
    MalformedArrayPatch { path: String, reason: String },
}
