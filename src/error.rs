//! Engine Error Taxonomy
//!
//! Every fallible operation in the engine surfaces one of four kinds:
//! validation (malformed input, rejected before any write), not-found
//! (unknown table/field/record/entity), conflict (duplicate names,
//! delete-with-dependents, unique-index violations), and query (a filter
//! expression the evaluator refuses to run, e.g. excessive nesting).

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Structurally invalid input, tied to a specific attribute
    #[error("validation failed on '{field}': {message}")]
    Validation {
        /// Offending attribute name
        field: String,
        /// What was wrong with it
        message: String,
    },

    /// Unknown table, field, relationship, record, or entity
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate name, delete-with-dependents, or unique-constraint violation
    #[error("conflict: {0}")]
    Conflict(String),

    /// Filter expression the evaluator cannot run
    #[error("query error: {0}")]
    Query(String),

    /// Corrupt metadata or other engine-side failures
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create a validation error for a named attribute
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a query error
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Query(_) => "QUERY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The attribute the error is about, when it names one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
