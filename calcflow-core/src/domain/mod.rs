//! Core domain types
//!
//! The entities of the ownership tree, root first:
//! Profile → Template → CalcJob → {Processing, OutputArtifact}.
//! They are shared between the store (persists) and the runner (drives).

pub mod artifact;
pub mod calcjob;
pub mod processing;
pub mod profile;
pub mod template;

pub use artifact::OutputArtifact;
pub use calcjob::CalcJob;
pub use processing::{Outcome, OutcomeCounts, Processing, Step, Transition};
pub use profile::{Credentials, Profile, TransferMode};
pub use template::Template;
