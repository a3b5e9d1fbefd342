//! Remote execution gateway
//!
//! The gateway transport lives outside this workspace. This module defines
//! the operations the runner needs from it, the per-profile handle cache, and
//! an in-memory gateway used for dry runs and tests.

mod cache;
mod memory;

use anyhow::Result;
use async_trait::async_trait;
use calcflow_core::domain::{Profile, TransferMode};
use calcflow_core::path::RemotePath;
use std::sync::Arc;

pub use cache::ConnectionCache;
pub use memory::{MemoryGateway, MemoryGatewayFactory};

/// State of a job as reported by the remote scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    /// The scheduler gave up on the job
    Failed(String),
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Links and special files; never followed nor downloaded
    Other,
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}

/// Authenticated handle to the remote execution gateway
///
/// A handle refreshes its own credentials and is shared by every calcjob of
/// its profile, so implementations must tolerate concurrent calls.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Creates a directory and its missing parents; an existing one is fine
    async fn mkdir(&self, path: &RemotePath) -> Result<()>;

    /// Writes `content` to `path`, overwriting any existing file
    async fn upload(&self, path: &RemotePath, content: Vec<u8>, mode: TransferMode) -> Result<()>;

    /// Submits a batch script already present on the remote host
    ///
    /// # Returns
    /// The scheduler's job identifier
    async fn submit(&self, script: &RemotePath) -> Result<String>;

    async fn job_state(&self, job_id: &str) -> Result<JobState>;

    async fn list_dir(&self, path: &RemotePath) -> Result<Vec<RemoteEntry>>;

    async fn download(&self, path: &RemotePath, mode: TransferMode) -> Result<Vec<u8>>;
}

/// Builds gateway handles from profiles; authentication happens here
#[async_trait]
pub trait GatewayFactory: Send + Sync {
    async fn connect(&self, profile: &Profile) -> Result<Arc<dyn Gateway>>;
}
