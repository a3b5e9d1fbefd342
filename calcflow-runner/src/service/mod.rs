//! Service layer
//!
//! Services contain the business logic of the runner: what each lifecycle
//! step does against the gateway and the object store.
//!
//! All services are trait-based to enable testing and dependency injection.

mod step;
pub mod transfer;

// Re-export traits
pub use step::StepService;

// Re-export implementations
pub use step::{StandardStepService, StepError, StepOutcome};
