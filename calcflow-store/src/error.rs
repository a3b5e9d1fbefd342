//! Error types for the store

use calcflow_core::CoreError;
use calcflow_core::domain::Step;
use calcflow_core::ids::CalcJobId;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur when reading or writing the store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A data-model contract was violated
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The database rejected or failed a statement
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The status moved between read and write
    #[error("status of calcjob {calcjob_id} changed concurrently (expected step {expected})")]
    Conflict {
        calcjob_id: CalcJobId,
        expected: Step,
    },
}

impl StoreError {
    /// The underlying data-model error, if any
    pub fn core(&self) -> Option<&CoreError> {
        match self {
            Self::Core(err) => Some(err),
            _ => None,
        }
    }

    /// Check if this error is a label uniqueness violation
    pub fn is_duplicate_label(&self) -> bool {
        self.core().is_some_and(CoreError::is_duplicate_label)
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        self.core().is_some_and(CoreError::is_not_found)
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self.core(), Some(CoreError::InvalidTransition { .. }))
    }

    pub fn is_orphan_reference(&self) -> bool {
        matches!(self.core(), Some(CoreError::OrphanReference { .. }))
    }
}

/// Check if a database error comes from a UNIQUE constraint
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Check if a database error comes from a FOREIGN KEY constraint
pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Maps a failed insert onto the data-model error it represents
///
/// Constraint violations without a mapping stay database errors.
pub(crate) fn insert_error(
    err: sqlx::Error,
    on_unique: Option<CoreError>,
    on_foreign_key: Option<CoreError>,
) -> StoreError {
    let mapped = if is_unique_violation(&err) {
        on_unique
    } else if is_foreign_key_violation(&err) {
        on_foreign_key
    } else {
        None
    };

    match mapped {
        Some(core) => StoreError::Core(core),
        None => StoreError::Database(err),
    }
}
