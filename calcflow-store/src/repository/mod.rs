//! Repository Module
//!
//! Data access layer for the store.
//! Each repository handles the SQL of one entity. Functions take a bare
//! connection so callers decide which of them share a transaction.

pub mod artifact;
pub mod calcjob;
pub mod processing;
pub mod profile;
pub mod template;

// Re-export for convenience
pub use artifact as artifact_repository;
pub use calcjob as calcjob_repository;
pub use processing as processing_repository;
pub use profile as profile_repository;
pub use template as template_repository;

/// Wraps a column value that does not decode into its domain type
pub(crate) fn decode_error(err: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}
