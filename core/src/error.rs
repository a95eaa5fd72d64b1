//! Error kinds shared by every stage of the pipeline.
//!
//! Callers match on the variant to decide whether a failure aborts the run,
//! skips a single document, or is logged and ignored.

use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, PortdumpError>;

/// Position of a parse failure inside a compose document (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    /// The literal source line, when it could be recovered.
    pub snippet: Option<String>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)?;
        if let Some(snippet) = &self.snippet {
            write!(f, " ({snippet:?})")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PortdumpError {
    #[error("compose document not found: {}", path.display())]
    DocumentNotFound { path: PathBuf },

    #[error("permission denied reading compose document: {}", path.display())]
    DocumentPermissionDenied { path: PathBuf },

    #[error("malformed compose document {}{}: {reason}", path.display(), location_suffix(location))]
    DocumentMalformed {
        path: PathBuf,
        location: Option<SourceLocation>,
        reason: String,
    },

    #[error("storage unavailable at {}: {reason}", path.display())]
    StorageUnavailable { path: PathBuf, reason: String },

    #[error("integrity violation in {table}: {detail}")]
    StorageIntegrityViolation { table: &'static str, detail: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("malformed port declaration {value:?} for service '{service}' in {}: {reason}", path.display())]
    PortDeclarationMalformed {
        path: PathBuf,
        service: String,
        value: String,
        reason: String,
    },

    #[error("config error: {field}: {reason}")]
    Config { field: String, reason: String },
}

fn location_suffix(location: &Option<SourceLocation>) -> String {
    match location {
        Some(loc) => format!(" at {loc}"),
        None => String::new(),
    }
}

impl PortdumpError {
    /// Failures that are logged and skipped without stopping the current phase.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PortdumpError::StorageIntegrityViolation { .. })
    }

    /// Failures raised while reading a single compose document.
    pub fn is_document_load_failure(&self) -> bool {
        matches!(
            self,
            PortdumpError::DocumentNotFound { .. }
                | PortdumpError::DocumentPermissionDenied { .. }
                | PortdumpError::DocumentMalformed { .. }
        )
    }

    /// Short machine-readable kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PortdumpError::DocumentNotFound { .. } => "document_not_found",
            PortdumpError::DocumentPermissionDenied { .. } => "document_permission_denied",
            PortdumpError::DocumentMalformed { .. } => "document_malformed",
            PortdumpError::StorageUnavailable { .. } => "storage_unavailable",
            PortdumpError::StorageIntegrityViolation { .. } => "storage_integrity_violation",
            PortdumpError::Storage(_) => "storage",
            PortdumpError::RuntimeUnavailable(_) => "runtime_unavailable",
            PortdumpError::PortDeclarationMalformed { .. } => "port_declaration_malformed",
            PortdumpError::Config { .. } => "config",
        }
    }
}
