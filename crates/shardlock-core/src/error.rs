use thiserror::Error;

use crate::directory::DirectoryError;

/// Errors surfaced by lock manager operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// A required field is missing or empty. Raised before any store call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Acquire found a lock record of the same name already in the store.
    #[error("Lock record already exists: {0}")]
    Conflict(String),

    /// Release or clone found no lock record matching the given key.
    #[error("Lock record not found: {0}")]
    NotFound(String),

    /// More than one lock record was found where exactly one was expected.
    /// Indicates a duplicate-creation race or store corruption; surfaced,
    /// never silently resolved.
    #[error("Lock invariant violated: {0}")]
    InvariantViolation(String),

    /// A lock name or record body that does not match the wire scheme.
    #[error("Malformed lock data: {0}")]
    Malformed(String),

    /// An underlying remote directory failure, with the operation and
    /// object name attached so callers can decide on retry.
    #[error("Remote store {op} failed for '{name}': {source}")]
    Store {
        op: &'static str,
        name: String,
        #[source]
        source: DirectoryError,
    },
}

/// Convenience alias for lock operation results.
pub type LockResult<T> = Result<T, LockError>;
