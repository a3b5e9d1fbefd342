//! Step service
//!
//! Performs the action implied by a calcjob's current step and reports the
//! transition to persist next:
//! - created: check the script renders
//! - uploading: create the remote folder, upload `job.sh` and both manifests
//! - submitting: submit `job.sh` and report the job id
//! - running: poll the scheduler until the job finishes
//! - retrieving: download matching files and record them in an artifact
//!
//! Apart from retrieval, the service never writes the status itself; the
//! caller persists the returned transition before asking for the next step.
//! Retrieval records its artifact and finalises in one store transaction, so
//! a calcjob resumed at `retrieving` never records its results twice.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use calcflow_core::CoreError;
use calcflow_core::domain::calcjob::JOB_SCRIPT_NAME;
use calcflow_core::domain::{Processing, Step, Transition, TransferMode};
use calcflow_core::render::{ScriptBindings, render_script};
use calcflow_store::{CalcJobContext, Store};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::gateway::{ConnectionCache, Gateway, JobState};
use crate::object_store::ObjectStore;
use crate::service::transfer;

/// Why a step did not produce a transition
#[derive(Debug, Error)]
pub enum StepError {
    /// The step cannot start; the status stays untouched and the caller
    /// decides whether to fix and retry (render errors, unreachable gateway)
    #[error(transparent)]
    Rejected(#[from] CoreError),

    /// The step's action failed; the caller records it and finalises
    #[error("{0:#}")]
    Failed(anyhow::Error),
}

/// What a performed step leaves for the caller
#[derive(Debug)]
pub enum StepOutcome {
    /// Persist this transition before the next step
    Next(Transition),
    /// The step persisted its transition together with its results
    Persisted(Processing),
}

/// Service trait for performing lifecycle steps
#[async_trait]
pub trait StepService: Send + Sync {
    /// Performs the action of the current step
    ///
    /// # Arguments
    /// * `context` - The calcjob with its owners and current status
    ///
    /// # Returns
    /// The transition to persist once the action succeeded, or the status
    /// the step already persisted
    async fn perform(&self, context: &CalcJobContext) -> Result<StepOutcome, StepError>;
}

/// Standard implementation of StepService
pub struct StandardStepService {
    connections: Arc<ConnectionCache>,
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn Store>,
    job_poll_interval: Duration,
    job_timeout: Option<Duration>,
    max_listing_calls: usize,
}

impl StandardStepService {
    /// Creates a new standard step service
    pub fn new(
        connections: Arc<ConnectionCache>,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn Store>,
        config: &Config,
    ) -> Self {
        Self {
            connections,
            objects,
            store,
            job_poll_interval: config.job_poll_interval,
            job_timeout: config.job_timeout,
            max_listing_calls: config.max_listing_calls,
        }
    }

    fn render(context: &CalcJobContext) -> Result<String, CoreError> {
        let bindings =
            ScriptBindings::for_calcjob(&context.profile, &context.template, &context.calcjob);
        render_script(&context.template.script, &bindings)
    }

    async fn gateway(&self, context: &CalcJobContext) -> Result<Arc<dyn Gateway>, StepError> {
        Ok(self.connections.get(&context.profile).await?)
    }

    /// Creates the remote folder and stages the script and both manifests
    async fn upload(&self, context: &CalcJobContext, gateway: &dyn Gateway) -> Result<()> {
        let profile = &context.profile;
        let folder = context.calcjob.remote_path(profile);

        gateway
            .mkdir(&folder)
            .await
            .with_context(|| format!("Failed to create remote folder {}", folder))?;

        let script = Self::render(context)?;
        gateway
            .upload(
                &folder.join(JOB_SCRIPT_NAME),
                script.into_bytes(),
                TransferMode::Direct,
            )
            .await
            .with_context(|| format!("Failed to upload {}", JOB_SCRIPT_NAME))?;

        let mut uploaded = 0;
        for manifest in [&context.template.upload, &context.calcjob.upload] {
            uploaded += transfer::stage_manifest(
                gateway,
                self.objects.as_ref(),
                profile,
                &folder,
                manifest,
            )
            .await?;
        }

        info!(
            "CalcJob {} staged {} file(s) into {}",
            context.calcjob.id, uploaded, folder
        );
        Ok(())
    }

    async fn submit(&self, context: &CalcJobContext, gateway: &dyn Gateway) -> Result<String> {
        let script = context.calcjob.script_path(&context.profile);
        let job_id = gateway
            .submit(&script)
            .await
            .with_context(|| format!("Failed to submit {}", script))?;

        info!("CalcJob {} submitted as job {}", context.calcjob.id, job_id);
        Ok(job_id)
    }

    /// Waits for the job to finish, bounded by the configured timeout
    async fn wait(&self, context: &CalcJobContext, gateway: &dyn Gateway) -> Result<()> {
        let job_id = context
            .processing
            .job_id
            .as_deref()
            .ok_or_else(|| anyhow!("CalcJob {} is running without a job id", context.calcjob.id))?;

        match self.job_timeout {
            Some(limit) => tokio::time::timeout(limit, self.poll(gateway, job_id))
                .await
                .map_err(|_| anyhow!("Job {} did not finish within {:?}", job_id, limit))?,
            None => self.poll(gateway, job_id).await,
        }
    }

    /// Polls until the scheduler reports the job finished
    async fn poll(&self, gateway: &dyn Gateway, job_id: &str) -> Result<()> {
        loop {
            let state = gateway
                .job_state(job_id)
                .await
                .with_context(|| format!("Failed to query job {}", job_id))?;

            match &state {
                JobState::Completed => return Ok(()),
                JobState::Failed(reason) => bail!("Job {} failed: {}", job_id, reason),
                JobState::Pending | JobState::Running => {
                    debug!("Job {} is {:?}", job_id, state);
                    tokio::time::sleep(self.job_poll_interval).await;
                }
            }
        }
    }

    /// Downloads matching files, records them in one artifact and finalises
    async fn retrieve(
        &self,
        context: &CalcJobContext,
        gateway: &dyn Gateway,
    ) -> Result<Processing> {
        let profile = &context.profile;
        let calcjob = &context.calcjob;
        let folder = calcjob.remote_path(profile);
        let matcher = calcjob.download_globs.matcher()?;

        let files = transfer::retrieve_matching(
            gateway,
            self.objects.as_ref(),
            profile,
            &folder,
            &matcher,
            self.max_listing_calls,
        )
        .await?;

        let paths: Vec<&String> = files.keys().collect();
        let mut attributes = serde_json::Map::new();
        attributes.insert("paths".to_string(), json!(paths));
        attributes.insert("files".to_string(), json!(files));

        let (artifact, processing) = self
            .store
            .complete_retrieval(&context.processing, attributes)
            .await
            .context("Failed to record retrieved files")?;

        info!(
            "CalcJob {} retrieved {} file(s) into artifact {}",
            calcjob.id,
            files.len(),
            artifact.id
        );
        Ok(processing)
    }
}

#[async_trait]
impl StepService for StandardStepService {
    async fn perform(&self, context: &CalcJobContext) -> Result<StepOutcome, StepError> {
        let step = context.processing.step;

        match step {
            Step::Created => {
                Self::render(context)?;
                Ok(StepOutcome::Next(Transition::advance(Step::Uploading)))
            }
            Step::Uploading => {
                let gateway = self.gateway(context).await?;
                self.upload(context, gateway.as_ref())
                    .await
                    .map_err(StepError::Failed)?;
                Ok(StepOutcome::Next(Transition::advance(Step::Submitting)))
            }
            Step::Submitting => {
                let gateway = self.gateway(context).await?;
                let job_id = self
                    .submit(context, gateway.as_ref())
                    .await
                    .map_err(StepError::Failed)?;
                Ok(StepOutcome::Next(Transition::submitted(job_id)))
            }
            Step::Running => {
                let gateway = self.gateway(context).await?;
                self.wait(context, gateway.as_ref())
                    .await
                    .map_err(StepError::Failed)?;
                Ok(StepOutcome::Next(Transition::advance(Step::Retrieving)))
            }
            Step::Retrieving => {
                let gateway = self.gateway(context).await?;
                let processing = self
                    .retrieve(context, gateway.as_ref())
                    .await
                    .map_err(StepError::Failed)?;
                Ok(StepOutcome::Persisted(processing))
            }
            Step::Finalised => Err(StepError::Rejected(CoreError::InvalidTransition {
                from: step,
                to: step,
            })),
        }
    }
}
