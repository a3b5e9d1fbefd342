//! Calcflow Runner
//!
//! Drives calcjobs through their lifecycle against a remote execution gateway.
//!
//! Architecture:
//! - Configuration: settings from the environment or defaults
//! - Gateway: the remote transport interface and its per-profile connection cache
//! - Object store: file content addressed by opaque keys
//! - Services: what each lifecycle step does (staging, submission, retrieval)
//! - Scheduler: calcjob polling, concurrency and status persistence
//!
//! Every step outcome is persisted before the next step starts, so a runner
//! restarted at any point resumes each calcjob from its stored step.

pub mod config;
pub mod gateway;
pub mod object_store;
pub mod scheduler;
pub mod service;

pub use config::Config;
pub use gateway::{ConnectionCache, Gateway, GatewayFactory, JobState};
pub use object_store::{FileObjectStore, InMemoryObjectStore, ObjectStore};
pub use scheduler::CalcJobPoller;
pub use service::{StandardStepService, StepError, StepOutcome, StepService};
