//! Calcflow Core
//!
//! Core types and abstractions for tracking calcjobs on a remote HPC resource.
//!
//! This crate contains:
//! - Domain types: Profile, Template, CalcJob, Processing, OutputArtifact
//! - The lifecycle state machine and its single transition function
//! - Remote path and manifest semantics for posix and windows hosts
//! - Script rendering
//! - DTOs: creation requests consumed by the store

pub mod domain;
pub mod dto;
pub mod error;
pub mod ids;
pub mod manifest;
pub mod names;
pub mod path;
pub mod render;

pub use error::{CoreError, Result};
pub use ids::{ArtifactId, CalcJobId, ProcessingId, ProfileId, TemplateId};
