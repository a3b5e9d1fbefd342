//! Error types for the calcflow core

use thiserror::Error;

use crate::domain::processing::Step;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the data model and its contracts
#[derive(Debug, Error)]
pub enum CoreError {
    /// A profile label, or a template label within one profile, is already taken
    #[error("{entity} label already exists: {label}")]
    DuplicateLabel { entity: &'static str, label: String },

    /// The gateway handle for a profile could not be constructed
    #[error("connection failed: {0}")]
    Connection(String),

    /// A script references a binding or field that does not exist
    #[error("template render failed: {0}")]
    TemplateRender(String),

    /// A state change that skips or reverses the step order
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: Step, to: Step },

    /// An entity references an owner that does not exist
    #[error("{entity} references missing {owner} {id}")]
    OrphanReference {
        entity: &'static str,
        owner: &'static str,
        id: i64,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Upload manifest keys must be relative POSIX paths
    #[error("invalid manifest path {path:?}: {reason}")]
    InvalidManifestPath { path: String, reason: &'static str },

    #[error("invalid download glob {pattern:?}: {reason}")]
    InvalidGlob { pattern: String, reason: String },
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Check if this error is a uniqueness violation
    pub fn is_duplicate_label(&self) -> bool {
        matches!(self, Self::DuplicateLabel { .. })
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A stored enum value that does not name any known variant
#[derive(Debug, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}
