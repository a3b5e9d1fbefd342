//! Scheduler layer for the runner
//!
//! This layer picks up unfinished calcjobs from the store and drives each
//! one through its lifecycle, persisting every transition before the next
//! step starts.

pub mod poller;

pub use poller::CalcJobPoller;
