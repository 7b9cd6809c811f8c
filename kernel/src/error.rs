//! Error types for the context kernel.

use thiserror::Error;

/// Errors surfaced by kernel operations.
///
/// Faults raised by sandboxed code are normally carried as data in
/// [`crate::python::ExecutionResult`]; `ExecutionFault` exists for callers
/// that want to turn such a result into an error.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The session has no variable with this name.
    #[error("variable not found: {name}")]
    VariableNotFound {
        /// Requested variable name.
        name: String,
        /// Names currently loaded in the session.
        available: Vec<String>,
    },

    /// No registry entry for the handle.
    #[error("handle not found: {handle}")]
    HandleNotFound {
        /// Requested handle.
        handle: String,
    },

    /// A load would push the session over its quota.
    #[error("session {session} would exceed {limit} byte limit (current usage {current} bytes)")]
    QuotaExceeded {
        /// Session that rejected the load.
        session: String,
        /// Accounted usage before the load.
        current: usize,
        /// Configured quota.
        limit: usize,
    },

    /// Scan pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {detail}")]
    InvalidPattern {
        /// Pattern as supplied by the caller.
        pattern: String,
        /// Parser detail from the regex engine.
        detail: String,
    },

    /// Tool name not recognised by the dispatcher.
    #[error("unknown operation: {name}")]
    UnknownOperation {
        /// Requested operation name.
        name: String,
    },

    /// Sandboxed code raised.
    #[error("{kind}: {message}")]
    ExecutionFault {
        /// Exception class name.
        kind: String,
        /// Exception message.
        message: String,
    },

    /// Generic internal error (interpreter start-up, config IO).
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl KernelError {
    /// Machine-readable kind string used in structured error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::VariableNotFound { .. } => "variable_not_found",
            Self::HandleNotFound { .. } => "handle_not_found",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::UnknownOperation { .. } => "unknown_operation",
            Self::ExecutionFault { .. } => "execution_fault",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Short remediation hint for the caller.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::VariableNotFound { .. } => "Use list_vars to see all available variables",
            Self::HandleNotFound { .. } => {
                "The handle was never registered or has expired; register a new one"
            }
            Self::QuotaExceeded { .. } => "Unload unused variables and try again",
            Self::InvalidPattern { .. } => "Provide a valid regex pattern",
            Self::UnknownOperation { .. } => "Check the operation name",
            Self::ExecutionFault { .. } => "Check the error and fix the Python code",
            Self::Internal(_) => "Retry the operation",
        }
    }
}

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
