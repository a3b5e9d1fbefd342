//! Data Transfer Objects
//!
//! Creation requests consumed by the store. Identities, generated uuids and
//! timestamps are assigned by the store, never by the caller.

pub mod artifact;
pub mod calcjob;
pub mod profile;
pub mod template;
