//! Error types for the DataNexus core.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`LoadError`] - dataset ingestion errors
//! - [`OpError`] - operation construction-time validation errors
//! - [`ApplyError`] - operation apply-time errors
//! - [`PipelineError`] - pipeline run failures with the offending step index
//! - [`ExportError`] - serialization errors
//! - [`SessionError`] - session-level errors
//! - [`ServerError`] - HTTP server errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries. All errors are
//! recoverable at the session level; none is process-fatal.

use thiserror::Error;

// =============================================================================
// Ingestion Errors
// =============================================================================

/// Errors while loading a raw dataset.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to read the input.
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// The declared format is not supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Failed to decode the input bytes.
    #[error("Failed to decode input: {0}")]
    Encoding(String),

    /// Malformed input that cannot be parsed into a table.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Input contains no header row.
    #[error("Input file is empty")]
    EmptyFile,
}

// =============================================================================
// Operation Validation Errors (construction-time)
// =============================================================================

/// Maximum number of values accepted in a `FilterRows` `in` list.
pub const MAX_IN_LIST_VALUES: usize = 1_000;

/// Errors raised when validating an operation against a schema.
///
/// Validation runs at construction time (fail-fast, before the operation
/// enters a pipeline) and again when the operation is applied, since the
/// schema can change upstream in the pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpError {
    /// A referenced column is absent from the schema.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// The operation's parameters are incompatible with the column's type.
    #[error("Type mismatch on column '{column}': {message}")]
    TypeMismatch { column: String, message: String },

    /// An `in` list exceeds [`MAX_IN_LIST_VALUES`].
    #[error("'in' list has {0} values, limit is {MAX_IN_LIST_VALUES}")]
    OversizedInList(usize),
}

impl OpError {
    pub fn type_mismatch(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Apply Errors
// =============================================================================

/// Kind of an apply-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyErrorKind {
    UnknownColumn,
    TypeMismatch,
    OversizedInList,
}

impl std::fmt::Display for ApplyErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownColumn => write!(f, "unknown column"),
            Self::TypeMismatch => write!(f, "type mismatch"),
            Self::OversizedInList => write!(f, "oversized 'in' list"),
        }
    }
}

/// An operation failed while being applied to a table.
///
/// Carries the failure kind plus a human-readable message naming the
/// operation and column involved, so the caller can highlight the step.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ApplyError {
    pub kind: ApplyErrorKind,
    pub message: String,
}

impl From<OpError> for ApplyError {
    fn from(err: OpError) -> Self {
        let kind = match err {
            OpError::UnknownColumn(_) => ApplyErrorKind::UnknownColumn,
            OpError::TypeMismatch { .. } => ApplyErrorKind::TypeMismatch,
            OpError::OversizedInList(_) => ApplyErrorKind::OversizedInList,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Pipeline Errors
// =============================================================================

/// A pipeline run aborted at a step.
///
/// `index` is the 0-based position of the failing operation. No partial
/// result is produced; the last successfully cached result stays available.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Pipeline step {index} failed: {cause}")]
pub struct PipelineError {
    pub index: usize,
    #[source]
    pub cause: ApplyError,
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while serializing a derived dataset.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV writer error.
    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),

    /// XLSX writer error.
    #[error("XLSX export error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// IO error flushing the output buffer.
    #[error("Export IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Session Errors
// =============================================================================

/// Errors from session-level interactions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No dataset has been uploaded yet.
    #[error("No dataset loaded")]
    NoDataset,

    /// An operation index is out of bounds for the current pipeline.
    #[error("Operation index {index} out of bounds, pipeline has {len} operations")]
    IndexOutOfBounds { index: usize, len: usize },

    /// An operation was rejected at construction time and not added.
    #[error("Operation rejected: {0}")]
    InvalidOperation(#[from] OpError),

    /// The pipeline failed to run.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The session id is not known to the manager.
    #[error("Unknown session: {0}")]
    UnknownSession(uuid::Uuid),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Ingestion failure.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Session-level failure.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Export failure.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for ingestion.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for operation validation.
pub type OpResult<T> = Result<T, OpError>;

/// Result type for applying a single operation.
pub type ApplyResult<T> = Result<T, ApplyError>;

/// Result type for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for exports.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for server handlers.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_error_to_apply_error() {
        let op_err = OpError::UnknownColumn("age".into());
        let apply_err: ApplyError = op_err.into();
        assert_eq!(apply_err.kind, ApplyErrorKind::UnknownColumn);
        assert!(apply_err.message.contains("age"));
    }

    #[test]
    fn test_pipeline_error_reports_index() {
        let err = PipelineError {
            index: 2,
            cause: ApplyError::from(OpError::type_mismatch("city", "mean requires a numeric column")),
        };
        let msg = err.to_string();
        assert!(msg.contains("step 2"));
        assert!(msg.contains("city"));
    }

    #[test]
    fn test_error_conversion_chain() {
        // OpError -> SessionError
        let op_err = OpError::OversizedInList(5000);
        let session_err: SessionError = op_err.into();
        assert!(session_err.to_string().contains("5000"));

        // SessionError -> ServerError
        let server_err: ServerError = SessionError::NoDataset.into();
        assert!(server_err.to_string().contains("No dataset"));
    }
}
