//! Error types for overlay engine operations.
//!
//! All fallible functions in this crate return [`Result<T>`], which uses [`Error`]
//! as the error type. External error types (`std::io::Error`, `serde_json::Error`,
//! bundle and patch errors) are converted via `From` impls.
//!
//! Lookups of unknown ids are not errors: they return `None` and are logged at
//! info level.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, editing or saving overlay data.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem I/O failed (reading game files, writing bundle copies, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or serialize JSON (configuration, decoded documents).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to parse a TOML configuration file.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Error from the `ovl_bundle` crate while loading or saving a bundle.
    #[error("Bundle error: {0}")]
    Bundle(#[from] ovl_bundle::Error),

    /// Configuration references something that does not exist.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An operation that needs a layer configuration ran before `set_bundles`.
    #[error("No bundles configured")]
    NotConfigured,

    /// A write or save was requested while no bundle is active.
    #[error("No active bundle")]
    NoActiveBundle,

    /// The resource type is neither declared nor an alias of a declared type.
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    /// The entity type is not declared in the configuration.
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// The entity type has no field with this name.
    #[error("Unknown field '{field}' on entity type '{entity_type}'")]
    UnknownField { entity_type: String, field: String },

    /// Computed fields are derived from other fields and cannot be written.
    #[error("Field '{field}' on entity type '{entity_type}' is read-only")]
    ReadOnlyField { entity_type: String, field: String },

    /// An operation targeted an entity id that does not exist in any partition.
    #[error("Entity not found: {entity_type}#{id}")]
    EntityNotFound { entity_type: String, id: i64 },

    /// No free id could be drawn from the entity's id range.
    #[error("Could not allocate an id for '{entity_type}' after {attempts} attempts")]
    IdRangeExhausted { entity_type: String, attempts: usize },

    /// A required field could not be synthesized for a new entity.
    #[error("Cannot create required field '{field}' on '{entity_type}': {reason}")]
    RequiredField {
        entity_type: String,
        field: String,
        reason: String,
    },

    /// A stored patch does not apply to the current base value.
    #[error("Failed to apply diff to {target}: {source}")]
    DiffApply {
        target: String,
        #[source]
        source: ovl_diff::Error,
    },

    /// A decoder adapter failed to produce objects.
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// The file codec cannot compute or apply structured diffs.
    #[error("File type does not support diffs: {0}")]
    DiffUnsupported(Utf8PathBuf),

    /// Neither the game data nor any layer provides this file.
    #[error("File not found: {0}")]
    FileNotFound(Utf8PathBuf),

    /// The file has not been opened through the engine.
    #[error("File is not open: {0}")]
    FileNotOpen(Utf8PathBuf),
}

impl Error {
    pub(crate) fn diff_apply(target: impl Into<String>, source: ovl_diff::Error) -> Self {
        Error::DiffApply {
            target: target.into(),
            source,
        }
    }
}
