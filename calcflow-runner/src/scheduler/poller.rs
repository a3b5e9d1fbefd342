//! CalcJob poller
//!
//! Polls the store for unfinished calcjobs and drives them to completion.
//! Each calcjob runs in its own task; a semaphore bounds how many run at once.

use anyhow::{Context, Result};
use calcflow_core::domain::{Processing, Transition};
use calcflow_core::ids::CalcJobId;
use calcflow_store::Store;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::service::{StepError, StepOutcome, StepService};

/// Drives calcjobs through their steps
#[derive(Clone)]
pub struct CalcJobPoller {
    config: Config,
    store: Arc<dyn Store>,
    steps: Arc<dyn StepService>,
    semaphore: Arc<Semaphore>,
}

impl CalcJobPoller {
    /// Creates a new calcjob poller
    pub fn new(config: Config, store: Arc<dyn Store>, steps: Arc<dyn StepService>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_jobs));
        Self {
            config,
            store,
            steps,
            semaphore,
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting calcjob poller (interval: {:?}, parallel: {})",
            self.config.poll_interval, self.config.max_parallel_jobs
        );

        let mut interval = time::interval(self.config.poll_interval);

        loop {
            interval.tick().await;

            debug!("Polling for unfinished calcjobs");

            match self.run_unfinished(self.config.batch_limit).await {
                Ok(driven) => {
                    if driven > 0 {
                        info!("Drove {} calcjob(s) this cycle", driven);
                    }
                }
                Err(e) => {
                    error!("Error during poll cycle: {:#}", e);
                }
            }
        }
    }

    /// Drives every unfinished calcjob, at most `limit` of them
    ///
    /// Errors of individual calcjobs are logged, not returned.
    ///
    /// # Returns
    /// The number of calcjobs picked up
    pub async fn run_unfinished(&self, limit: Option<usize>) -> Result<usize> {
        let unfinished = self
            .store
            .list_unfinished(limit)
            .await
            .context("Failed to fetch unfinished calcjobs")?;

        if unfinished.is_empty() {
            debug!("No unfinished calcjobs");
            return Ok(0);
        }

        info!("Found {} unfinished calcjob(s)", unfinished.len());

        let mut handles = Vec::with_capacity(unfinished.len());
        for processing in unfinished {
            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .context("Calcjob semaphore closed")?;
            handles.push(self.spawn_calcjob_task(processing.calcjob_id, permit));
        }

        let driven = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("CalcJob task panicked: {}", e);
            }
        }

        Ok(driven)
    }

    fn spawn_calcjob_task(
        &self,
        calcjob_id: CalcJobId,
        _permit: OwnedSemaphorePermit,
    ) -> tokio::task::JoinHandle<()> {
        let poller = self.clone();

        tokio::spawn(async move {
            match poller.run_calcjob(calcjob_id).await {
                Ok(processing) => debug!(
                    "CalcJob {} left at step {} ({})",
                    calcjob_id,
                    processing.step,
                    processing.outcome().as_str()
                ),
                Err(e) => error!("Failed to drive calcjob {}: {:#}", calcjob_id, e),
            }
            // Permit is released when dropped
        })
    }

    /// Drives one calcjob until it is finalised
    ///
    /// A failed step is recorded on the status and finalises the calcjob.
    /// A rejected step leaves the status as it was and is returned; its
    /// `CoreError` stays reachable through `downcast_ref`.
    pub async fn run_calcjob(&self, calcjob_id: CalcJobId) -> Result<Processing> {
        loop {
            let context = self
                .store
                .load_context(calcjob_id)
                .await
                .with_context(|| format!("Failed to load calcjob {}", calcjob_id))?;

            if context.processing.is_finished() {
                return Ok(context.processing);
            }

            let step = context.processing.step;
            debug!("CalcJob {} performing step {}", calcjob_id, step);

            let transition = match self.steps.perform(&context).await {
                Ok(StepOutcome::Next(transition)) => transition,
                Ok(StepOutcome::Persisted(_)) => continue,
                Err(StepError::Rejected(e)) => {
                    return Err(anyhow::Error::new(e)
                        .context(format!("CalcJob {} cannot leave step {}", calcjob_id, step)));
                }
                Err(StepError::Failed(e)) => {
                    warn!("CalcJob {} failed at step {}: {:#}", calcjob_id, step, e);
                    Transition::fail(format!("{:#}", e))
                }
            };

            self.store
                .apply_transition_from(&context.processing, transition)
                .await
                .with_context(|| format!("Failed to persist step {} of calcjob {}", step, calcjob_id))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ConnectionCache, GatewayFactory, MemoryGateway, MemoryGatewayFactory};
    use crate::object_store::{InMemoryObjectStore, ObjectStore, content_key};
    use crate::service::StandardStepService;
    use calcflow_core::CoreError;
    use calcflow_core::domain::{Credentials, Step};
    use calcflow_core::dto::calcjob::CreateCalcJob;
    use calcflow_core::dto::profile::CreateProfile;
    use calcflow_core::dto::template::CreateTemplate;
    use calcflow_core::manifest::{DownloadGlobs, UploadManifest};
    use calcflow_store::SqliteStore;
    use serde_json::json;
    use std::time::Duration;

    const SCRIPT: &str = "cd {{ invocation.remote_path }}\n./pw.x --steps {{ invocation.parameters.steps }}\n";

    struct Harness {
        poller: CalcJobPoller,
        store: Arc<SqliteStore>,
        objects: Arc<InMemoryObjectStore>,
    }

    fn test_config() -> Config {
        let mut config = Config::new("sqlite::memory:".to_string());
        config.max_parallel_jobs = 2;
        config.job_poll_interval = Duration::from_millis(1);
        config
    }

    async fn harness(factory: MemoryGatewayFactory) -> Harness {
        let config = test_config();
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let objects = Arc::new(InMemoryObjectStore::new());

        let factory: Arc<dyn GatewayFactory> = Arc::new(factory);
        let dyn_store: Arc<dyn Store> = store.clone();
        let dyn_objects: Arc<dyn ObjectStore> = objects.clone();
        let steps = StandardStepService::new(
            Arc::new(ConnectionCache::new(factory)),
            dyn_objects,
            Arc::clone(&dyn_store),
            &config,
        );

        Harness {
            poller: CalcJobPoller::new(config, dyn_store, Arc::new(steps)),
            store,
            objects,
        }
    }

    async fn calcjob(harness: &Harness, script: &str) -> calcflow_core::domain::CalcJob {
        let input = harness.objects.add_bytes(b"K_POINTS 4".to_vec()).await.unwrap();

        let profile = harness
            .store
            .create_profile(
                CreateProfile::new(
                    "https://gw.example",
                    Credentials::new("client", "secret", "https://auth.example/token"),
                    "hpc",
                    "/home/u",
                )
                .with_label("hpc"),
            )
            .await
            .unwrap();
        let template = harness
            .store
            .create_template(
                CreateTemplate::new(profile.id, script)
                    .with_label("pw")
                    .with_upload(UploadManifest::new().with_file("inputs/pw.in", input)),
            )
            .await
            .unwrap();
        let (calcjob, _) = harness
            .store
            .create_calcjob(
                CreateCalcJob::new(template.id)
                    .with_parameter("steps", json!(3))
                    .with_upload(UploadManifest::new().with_dir("scratch"))
                    .with_download_globs(DownloadGlobs::new(["out/*.txt"])),
            )
            .await
            .unwrap();
        calcjob
    }

    fn working_gateway() -> Arc<MemoryGateway> {
        Arc::new(
            MemoryGateway::new()
                .with_polls_until_done(2)
                .with_outputs([
                    ("out/energy.txt", b"-42.1".to_vec()),
                    ("out/forces.dat", b"0 0 0".to_vec()),
                    ("pw.log", b"done".to_vec()),
                ]),
        )
    }

    #[tokio::test]
    async fn test_run_calcjob_success() {
        let gateway = working_gateway();
        let harness = harness(MemoryGatewayFactory::new(Arc::clone(&gateway))).await;
        let calcjob = calcjob(&harness, SCRIPT).await;
        let folder = format!("/home/u/workflows/{}", calcjob.uuid);

        let processing = harness.poller.run_calcjob(calcjob.id).await.unwrap();
        assert_eq!(processing.step, Step::Finalised);
        assert_eq!(processing.failure, None);
        assert_eq!(processing.job_id.as_deref(), Some("1001"));

        let script = gateway.file(&format!("{}/job.sh", folder)).await.unwrap();
        assert_eq!(
            String::from_utf8(script).unwrap(),
            format!("cd {}\n./pw.x --steps 3", folder)
        );
        assert_eq!(
            gateway.file(&format!("{}/inputs/pw.in", folder)).await,
            Some(b"K_POINTS 4".to_vec())
        );
        assert!(gateway.is_dir(&format!("{}/scratch", folder)).await);
        assert_eq!(gateway.submitted().await, vec![format!("{}/job.sh", folder)]);

        let artifacts = harness.store.list_artifacts(calcjob.id).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        let key = content_key(b"-42.1");
        assert_eq!(
            artifacts[0].attributes["files"],
            json!({ "out/energy.txt": key })
        );
        assert_eq!(artifacts[0].attributes["paths"], json!(["out/energy.txt"]));
        assert_eq!(harness.objects.get(&key).await.unwrap(), b"-42.1".to_vec());
    }

    #[tokio::test]
    async fn test_run_calcjob_submit_failure_is_recorded() {
        let gateway = Arc::new(MemoryGateway::new().with_submit_error("queue closed"));
        let harness = harness(MemoryGatewayFactory::new(gateway)).await;
        let calcjob = calcjob(&harness, SCRIPT).await;

        let processing = harness.poller.run_calcjob(calcjob.id).await.unwrap();
        assert_eq!(processing.step, Step::Finalised);
        assert_eq!(processing.job_id, None);
        assert!(processing.failure.unwrap().contains("queue closed"));
        assert!(harness.store.list_artifacts(calcjob.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_calcjob_remote_job_failure_is_recorded() {
        let gateway = Arc::new(MemoryGateway::new().with_job_failure("segmentation fault"));
        let harness = harness(MemoryGatewayFactory::new(gateway)).await;
        let calcjob = calcjob(&harness, SCRIPT).await;

        let processing = harness.poller.run_calcjob(calcjob.id).await.unwrap();
        assert_eq!(processing.step, Step::Finalised);
        assert_eq!(processing.job_id.as_deref(), Some("1001"));
        assert!(processing.failure.unwrap().contains("segmentation fault"));
    }

    #[tokio::test]
    async fn test_run_calcjob_render_error_keeps_status() {
        let gateway = working_gateway();
        let harness = harness(MemoryGatewayFactory::new(Arc::clone(&gateway))).await;
        let calcjob = calcjob(&harness, "run {{ invocation.parameters.missing }}").await;

        let err = harness.poller.run_calcjob(calcjob.id).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::TemplateRender(_))
        ));

        let processing = harness.store.get_processing(calcjob.id).await.unwrap();
        assert_eq!(processing.step, Step::Created);
        assert_eq!(processing.failure, None);
        assert!(gateway.submitted().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_calcjob_connection_error_keeps_status() {
        let harness = harness(MemoryGatewayFactory::refusing("gateway down")).await;
        let calcjob = calcjob(&harness, SCRIPT).await;

        let err = harness.poller.run_calcjob(calcjob.id).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::Connection(_))
        ));

        let processing = harness.store.get_processing(calcjob.id).await.unwrap();
        assert_eq!(processing.step, Step::Uploading);
        assert_eq!(processing.failure, None);
    }

    #[tokio::test]
    async fn test_run_calcjob_finished_is_noop() {
        let gateway = working_gateway();
        let harness = harness(MemoryGatewayFactory::new(Arc::clone(&gateway))).await;
        let calcjob = calcjob(&harness, SCRIPT).await;

        harness.poller.run_calcjob(calcjob.id).await.unwrap();
        let again = harness.poller.run_calcjob(calcjob.id).await.unwrap();

        assert_eq!(again.step, Step::Finalised);
        assert_eq!(gateway.submitted().await.len(), 1);
        assert_eq!(harness.store.list_artifacts(calcjob.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_unfinished_drives_all() {
        let gateway = working_gateway();
        let harness = harness(MemoryGatewayFactory::new(Arc::clone(&gateway))).await;
        let first = calcjob(&harness, SCRIPT).await;
        let (second, _) = harness
            .store
            .create_calcjob(CreateCalcJob::new(first.template_id))
            .await
            .unwrap();
        let (third, _) = harness
            .store
            .create_calcjob(CreateCalcJob::new(first.template_id))
            .await
            .unwrap();

        let driven = harness.poller.run_unfinished(None).await.unwrap();
        assert_eq!(driven, 3);

        for id in [first.id, second.id, third.id] {
            let processing = harness.store.get_processing(id).await.unwrap();
            assert_eq!(processing.step, Step::Finalised);
            assert_eq!(processing.failure, None);
        }

        let counts = harness.store.count_outcomes().await.unwrap();
        assert_eq!(counts.succeeded, 3);
        assert_eq!(harness.poller.run_unfinished(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_unfinished_respects_limit() {
        let gateway = working_gateway();
        let harness = harness(MemoryGatewayFactory::new(gateway)).await;
        let first = calcjob(&harness, SCRIPT).await;
        harness
            .store
            .create_calcjob(CreateCalcJob::new(first.template_id))
            .await
            .unwrap();

        assert_eq!(harness.poller.run_unfinished(Some(1)).await.unwrap(), 1);
        assert_eq!(harness.store.list_unfinished(None).await.unwrap().len(), 1);
    }
}
