use camino::Utf8PathBuf;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("Invalid bundle name: {name}")]
    #[diagnostic(
        code(bundle::invalid_name),
        help("Bundle names must be alphanumeric and contain no spaces or special characters")
    )]
    InvalidBundleName {
        name: String,
        #[label("invalid bundle name")]
        span: Option<SourceSpan>,
    },

    #[error("Bundle already exists: {path}")]
    #[diagnostic(
        code(bundle::already_exists),
        help("Pick another name or remove the existing bundle.json first")
    )]
    BundleExists { path: Utf8PathBuf },

    #[error("File not found: {path}")]
    #[diagnostic(
        code(file::not_found),
        help("Make sure the file exists and the path is correct")
    )]
    FileNotFound { path: Utf8PathBuf },

    #[error("Invalid JSON document: {path}")]
    #[diagnostic(code(file::invalid_json), help("Check the file for syntax errors"))]
    InvalidDocument {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Active bundle {path} is not part of the bundle stack")]
    #[diagnostic(
        code(layer::unknown_active),
        help("Pass the same directory to --bundle as well, in the position it should take")
    )]
    UnknownActiveBundle { path: Utf8PathBuf },

    #[error("{entity_type} #{id} does not exist")]
    #[diagnostic(
        code(entity::not_found),
        help("Neither the decoded game data nor any bundle defines this id")
    )]
    EntityNotFound { entity_type: String, id: i64 },
}

impl CliError {
    pub fn invalid_bundle_name(name: String, span: Option<SourceSpan>) -> Self {
        Self::InvalidBundleName { name, span }
    }

    pub fn file_not_found(path: Utf8PathBuf) -> Self {
        Self::FileNotFound { path }
    }
}
