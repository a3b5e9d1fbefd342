//! In-memory gateway for dry runs
//!
//! Keeps a fake remote filesystem and scheduler in process memory. A
//! submitted job reports `Running` for a configurable number of polls, then
//! finishes and leaves a fixed set of output files next to its script.

use anyhow::{Result, bail};
use async_trait::async_trait;
use calcflow_core::domain::{Profile, TransferMode};
use calcflow_core::path::RemotePath;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{EntryKind, Gateway, GatewayFactory, JobState, RemoteEntry};

/// A recorded file transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub path: String,
    pub mode: TransferMode,
    pub upload: bool,
}

#[derive(Default)]
struct RemoteState {
    dirs: HashSet<RemotePath>,
    files: HashMap<RemotePath, Vec<u8>>,
    jobs: HashMap<String, usize>,
    next_job: u64,
    submitted: Vec<String>,
    transfers: Vec<Transfer>,
}

impl RemoteState {
    fn mkdir_all(&mut self, path: &RemotePath) -> Result<()> {
        let mut current = Some(path.clone());
        while let Some(dir) = current {
            if self.files.contains_key(&dir) {
                bail!("{}: is a file", dir);
            }
            current = dir.parent();
            self.dirs.insert(dir);
        }
        Ok(())
    }

    fn require_parent(&self, path: &RemotePath) -> Result<()> {
        match path.parent() {
            Some(parent) if self.dirs.contains(&parent) => Ok(()),
            Some(parent) => bail!("{}: no such directory", parent),
            None => bail!("{}: not a file path", path),
        }
    }
}

/// Dry-run gateway backed by process memory
///
/// Drives calcjobs through the whole lifecycle without network access: the
/// rendered script, uploads and downloads stay in this process. Embedders use
/// it to check templates and manifests before pointing a runner at a real
/// gateway; the runner's own tests use it as their remote.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<RemoteState>,
    outputs: Vec<(String, Vec<u8>)>,
    polls_until_done: usize,
    submit_error: Option<String>,
    job_failure: Option<String>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files every finished job leaves in its folder, keyed by relative POSIX path
    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        self.outputs = outputs
            .into_iter()
            .map(|(path, content)| (path.into(), content))
            .collect();
        self
    }

    pub fn with_polls_until_done(mut self, polls: usize) -> Self {
        self.polls_until_done = polls;
        self
    }

    /// Makes every submission fail with `message`
    pub fn with_submit_error(mut self, message: impl Into<String>) -> Self {
        self.submit_error = Some(message.into());
        self
    }

    /// Makes every job end in `Failed(reason)`
    pub fn with_job_failure(mut self, reason: impl Into<String>) -> Self {
        self.job_failure = Some(reason.into());
        self
    }

    /// Content of a remote file, looked up by its rendered path
    pub async fn file(&self, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        state
            .files
            .iter()
            .find(|(p, _)| p.to_string() == path)
            .map(|(_, content)| content.clone())
    }

    pub async fn is_dir(&self, path: &str) -> bool {
        let state = self.state.lock().await;
        state.dirs.iter().any(|p| p.to_string() == path)
    }

    /// Script paths submitted so far, in order
    pub async fn submitted(&self) -> Vec<String> {
        self.state.lock().await.submitted.clone()
    }

    pub async fn transfers(&self) -> Vec<Transfer> {
        self.state.lock().await.transfers.clone()
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn mkdir(&self, path: &RemotePath) -> Result<()> {
        self.state.lock().await.mkdir_all(path)
    }

    async fn upload(&self, path: &RemotePath, content: Vec<u8>, mode: TransferMode) -> Result<()> {
        let mut state = self.state.lock().await;
        state.require_parent(path)?;
        if state.dirs.contains(path) {
            bail!("{}: is a directory", path);
        }

        debug!("Uploading {} bytes to {} ({:?})", content.len(), path, mode);
        state.transfers.push(Transfer {
            path: path.to_string(),
            mode,
            upload: true,
        });
        state.files.insert(path.clone(), content);
        Ok(())
    }

    async fn submit(&self, script: &RemotePath) -> Result<String> {
        if let Some(message) = &self.submit_error {
            bail!("{}", message);
        }

        let mut state = self.state.lock().await;
        if !state.files.contains_key(script) {
            bail!("{}: no such file", script);
        }

        state.next_job += 1;
        let job_id = (1000 + state.next_job).to_string();
        state.submitted.push(script.to_string());
        state.jobs.insert(job_id.clone(), self.polls_until_done);

        if let Some(folder) = script.parent() {
            for (relative, content) in &self.outputs {
                let target = folder.join_posix(relative);
                if let Some(parent) = target.parent() {
                    state.mkdir_all(&parent)?;
                }
                state.files.insert(target, content.clone());
            }
        }

        Ok(job_id)
    }

    async fn job_state(&self, job_id: &str) -> Result<JobState> {
        let mut state = self.state.lock().await;
        let Some(remaining) = state.jobs.get_mut(job_id) else {
            bail!("unknown job {}", job_id);
        };

        if *remaining > 0 {
            *remaining -= 1;
            return Ok(JobState::Running);
        }

        Ok(match &self.job_failure {
            Some(reason) => JobState::Failed(reason.clone()),
            None => JobState::Completed,
        })
    }

    async fn list_dir(&self, path: &RemotePath) -> Result<Vec<RemoteEntry>> {
        let state = self.state.lock().await;
        if !state.dirs.contains(path) {
            bail!("{}: no such directory", path);
        }

        let is_child = |candidate: &RemotePath| candidate.parent().as_ref() == Some(path);
        let dirs = state.dirs.iter().filter(|d| is_child(*d)).map(|d| RemoteEntry {
            name: d.file_name().unwrap_or_default().to_string(),
            kind: EntryKind::Directory,
            size: 0,
        });
        let files = state
            .files
            .iter()
            .filter(|(f, _)| is_child(*f))
            .map(|(f, content)| RemoteEntry {
                name: f.file_name().unwrap_or_default().to_string(),
                kind: EntryKind::File,
                size: content.len() as u64,
            });

        let mut entries: Vec<RemoteEntry> = dirs.chain(files).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn download(&self, path: &RemotePath, mode: TransferMode) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        let Some(content) = state.files.get(path).cloned() else {
            bail!("{}: no such file", path);
        };

        debug!("Downloading {} bytes from {} ({:?})", content.len(), path, mode);
        state.transfers.push(Transfer {
            path: path.to_string(),
            mode,
            upload: false,
        });
        Ok(content)
    }
}

/// Factory handing every profile the same dry-run gateway
pub struct MemoryGatewayFactory {
    gateway: Arc<MemoryGateway>,
    refusal: Option<String>,
}

impl MemoryGatewayFactory {
    pub fn new(gateway: Arc<MemoryGateway>) -> Self {
        Self {
            gateway,
            refusal: None,
        }
    }

    /// A factory whose every connection attempt fails with `reason`
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            gateway: Arc::new(MemoryGateway::new()),
            refusal: Some(reason.into()),
        }
    }
}

#[async_trait]
impl GatewayFactory for MemoryGatewayFactory {
    async fn connect(&self, profile: &Profile) -> Result<Arc<dyn Gateway>> {
        if let Some(reason) = &self.refusal {
            bail!("cannot reach {}: {}", profile.gateway_url, reason);
        }
        let gateway: Arc<dyn Gateway> = self.gateway.clone();
        Ok(gateway)
    }
}
