//! Typed errors for the build pipeline and the query surface.
//!
//! Recoverable problems never become errors; they are recorded as
//! [`crate::diagnostics::BuildDiagnostic`]s. Only the conditions below abort
//! a run.

use std::path::PathBuf;

use crate::error_codes;

/// Fatal build failures. Raised before anything is written to the store.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Root source directory is missing or unreadable
    #[error("source root does not exist or is not a readable directory: {0}")]
    MissingRoot(PathBuf),

    /// Discovery and parsing produced nothing to analyze
    #[error("no usable C# syntax trees found under {0}")]
    NoSyntaxTrees(PathBuf),

    /// Writing or replacing the store failed
    #[error("failed to write store {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl BuildError {
    /// Stable error code for JSON error output.
    pub fn code(&self) -> &'static str {
        match self {
            BuildError::MissingRoot(_) => error_codes::MSC_IO_001_ROOT_NOT_FOUND,
            BuildError::NoSyntaxTrees(_) => error_codes::MSC_BLD_001_NO_SYNTAX_TREES,
            BuildError::Store { .. } => error_codes::MSC_BLD_002_STORE_WRITE_FAILED,
        }
    }
}

/// Errors raised by store queries that the CLI reports with a code.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("database not found: {0} (run `modscope build` first)")]
    MissingStore(PathBuf),

    #[error("no method matches '{0}'")]
    MethodNotFound(String),

    #[error("invalid method reference '{0}'")]
    InvalidMethodSpec(String),

    #[error("statement is not a read-only query: {0}")]
    NotReadOnly(String),
}

impl QueryError {
    /// Stable error code for JSON error output.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::MissingStore(_) => error_codes::MSC_IO_002_STORE_NOT_FOUND,
            QueryError::MethodNotFound(_) => error_codes::MSC_QRY_002_METHOD_NOT_FOUND,
            QueryError::InvalidMethodSpec(_) => error_codes::MSC_QRY_003_INVALID_PARAMS,
            QueryError::NotReadOnly(_) => error_codes::MSC_QRY_001_INVALID_QUERY,
        }
    }
}

/// Settings file could not be read or parsed.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read settings file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid settings file {0}: {1}")]
    Parse(PathBuf, String),
}

impl SettingsError {
    pub fn code(&self) -> &'static str {
        error_codes::MSC_CFG_001_INVALID_SETTINGS
    }
}

/// Find the stable code for an error produced anywhere in the crate.
pub fn code_for(err: &anyhow::Error) -> &'static str {
    if let Some(e) = err.downcast_ref::<BuildError>() {
        return e.code();
    }
    if let Some(e) = err.downcast_ref::<QueryError>() {
        return e.code();
    }
    if let Some(e) = err.downcast_ref::<SettingsError>() {
        return e.code();
    }
    if err.downcast_ref::<rusqlite::Error>().is_some() {
        return error_codes::MSC_QRY_001_INVALID_QUERY;
    }
    error_codes::MSC_GEN_001_UNCATEGORIZED
}
