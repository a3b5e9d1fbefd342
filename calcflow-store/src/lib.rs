//! Calcflow Store
//!
//! Persistence layer for the calcjob data model.
//!
//! Architecture:
//! - Store: the persistence interface every orchestrator programs against
//! - SqliteStore: sqlx/SQLite implementation of that interface
//! - Repositories: per-entity SQL, one free function per statement
//! - db: pool construction and schema migrations
//!
//! Unique labels, referential integrity and cascade deletes are enforced by
//! the schema; lifecycle legality is decided by `calcflow_core` and persisted
//! with a compare-and-set so no transition is ever observed half-applied.

pub mod db;
pub mod error;
pub mod repository;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{CalcJobContext, Page, SqliteStore, Store};
