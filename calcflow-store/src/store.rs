//! Store
//!
//! The persistence interface orchestrators program against, and its SQLite
//! implementation. Every operation that writes more than one row runs in a
//! single transaction; a failed operation leaves stored state unchanged.

use async_trait::async_trait;
use calcflow_core::CoreError;
use calcflow_core::domain::{
    CalcJob, OutcomeCounts, OutputArtifact, Processing, Profile, Step, Template, Transition,
};
use calcflow_core::dto::artifact::CreateArtifact;
use calcflow_core::dto::calcjob::CreateCalcJob;
use calcflow_core::dto::profile::CreateProfile;
use calcflow_core::dto::template::CreateTemplate;
use calcflow_core::ids::{CalcJobId, ProfileId, TemplateId};
use calcflow_core::names;
use serde_json::{Map, Value};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::db;
use crate::error::{Result, StoreError, insert_error};
use crate::repository::{
    artifact_repository, calcjob_repository, processing_repository, profile_repository,
    template_repository,
};

/// Picks of a pool label before a concurrent taker's win is reported
const LABEL_ATTEMPTS: usize = 5;

/// One page of a listing, numbered from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size,
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.number.max(1) - 1) * i64::from(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            size: 100,
        }
    }
}

/// Everything needed to perform the next step of one calcjob
#[derive(Debug, Clone)]
pub struct CalcJobContext {
    pub profile: Profile,
    pub template: Template,
    pub calcjob: CalcJob,
    pub processing: Processing,
}

/// Persistence interface for the calcjob data model
///
/// Implementations enforce label uniqueness, referential integrity, cascade
/// deletes along the ownership tree and atomic status transitions.
#[async_trait]
pub trait Store: Send + Sync {
    /// Creates a profile, drawing a free pool name when no label is given
    ///
    /// # Returns
    /// `DuplicateLabel` when the label is taken
    async fn create_profile(&self, req: CreateProfile) -> Result<Profile>;
    async fn get_profile(&self, id: ProfileId) -> Result<Profile>;
    async fn find_profile_by_label(&self, label: &str) -> Result<Option<Profile>>;
    async fn list_profiles(&self, page: Page) -> Result<Vec<Profile>>;
    /// Deletes a profile with its templates, calcjobs, statuses and artifacts
    async fn delete_profile(&self, id: ProfileId) -> Result<()>;

    /// Creates a template; the label is unique within the owning profile
    async fn create_template(&self, req: CreateTemplate) -> Result<Template>;
    async fn get_template(&self, id: TemplateId) -> Result<Template>;
    async fn list_templates(&self, profile_id: ProfileId) -> Result<Vec<Template>>;
    async fn delete_template(&self, id: TemplateId) -> Result<()>;

    /// Creates a calcjob together with its `created` status
    async fn create_calcjob(&self, req: CreateCalcJob) -> Result<(CalcJob, Processing)>;
    async fn get_calcjob(&self, id: CalcJobId) -> Result<CalcJob>;
    async fn list_calcjobs(&self, page: Page) -> Result<Vec<CalcJob>>;
    async fn list_calcjobs_for_template(&self, template_id: TemplateId) -> Result<Vec<CalcJob>>;
    /// Deletes a calcjob with exactly its status and artifacts
    async fn delete_calcjob(&self, id: CalcJobId) -> Result<()>;

    async fn get_processing(&self, calcjob_id: CalcJobId) -> Result<Processing>;
    /// Validates and persists one transition atomically
    ///
    /// # Returns
    /// The persisted snapshot, `InvalidTransition` for an illegal move, or
    /// `Conflict` when the status changed since it was read
    async fn apply_transition(
        &self,
        calcjob_id: CalcJobId,
        transition: Transition,
    ) -> Result<Processing>;
    /// Persists a transition computed from `current`, a snapshot the caller
    /// already acted upon
    ///
    /// # Returns
    /// `Conflict` when the stored step is no longer `current.step`
    async fn apply_transition_from(
        &self,
        current: &Processing,
        transition: Transition,
    ) -> Result<Processing>;
    /// Records the retrieval artifact and finalises the calcjob in one
    /// transaction, so a retrieval is never recorded twice
    ///
    /// # Returns
    /// `InvalidTransition` unless `current` is at `retrieving`, `Conflict`
    /// when the stored step moved on
    async fn complete_retrieval(
        &self,
        current: &Processing,
        attributes: Map<String, Value>,
    ) -> Result<(OutputArtifact, Processing)>;
    /// Statuses that are neither finalised nor failed, oldest first
    async fn list_unfinished(&self, limit: Option<usize>) -> Result<Vec<Processing>>;
    async fn count_outcomes(&self) -> Result<OutcomeCounts>;

    /// Records an artifact; the creator must exist
    async fn create_artifact(&self, req: CreateArtifact) -> Result<OutputArtifact>;
    async fn list_artifacts(&self, calcjob_id: CalcJobId) -> Result<Vec<OutputArtifact>>;

    /// Loads a calcjob with its owners and status
    async fn load_context(&self, calcjob_id: CalcJobId) -> Result<CalcJobContext>;
}

/// SQLite implementation of [`Store`]
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wraps an already migrated pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the database at `database_url` and runs migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = db::create_pool(database_url).await?;
        db::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Opens a private, migrated in-memory database
    pub async fn in_memory() -> Result<Self> {
        let pool = db::create_memory_pool().await?;
        db::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Opens a transaction holding the write lock from its first statement
    ///
    /// A deferred transaction that reads before writing cannot wait out
    /// `busy_timeout` when it upgrades; it fails with SQLITE_BUSY instead.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    async fn insert_profile(&self, req: &CreateProfile) -> Result<Profile> {
        let mut tx = self.begin_write().await?;

        let label = match &req.label {
            Some(label) => label.clone(),
            None => names::pick_label(&profile_repository::labels(&mut *tx).await?),
        };

        let profile = profile_repository::create(&mut *tx, &label, req)
            .await
            .map_err(|e| {
                insert_error(
                    e,
                    Some(CoreError::DuplicateLabel {
                        entity: "profile",
                        label: label.clone(),
                    }),
                    None,
                )
            })?;

        tx.commit().await?;
        Ok(profile)
    }

    async fn insert_template(&self, req: &CreateTemplate) -> Result<Template> {
        let mut tx = self.begin_write().await?;

        // Verify profile exists
        if !profile_repository::exists(&mut *tx, req.profile_id).await? {
            return Err(orphan("template", "profile", req.profile_id.get()));
        }

        let label = match &req.label {
            Some(label) => label.clone(),
            None => names::pick_label(
                &template_repository::labels_for_profile(&mut *tx, req.profile_id).await?,
            ),
        };

        let template = template_repository::create(&mut *tx, &label, req)
            .await
            .map_err(|e| {
                insert_error(
                    e,
                    Some(CoreError::DuplicateLabel {
                        entity: "template",
                        label: label.clone(),
                    }),
                    Some(orphan_error("template", "profile", req.profile_id.get())),
                )
            })?;

        tx.commit().await?;
        Ok(template)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_profile(&self, req: CreateProfile) -> Result<Profile> {
        let mut attempt = 1;
        let profile = loop {
            match self.insert_profile(&req).await {
                // A pool label taken between pick and insert is picked again
                Err(e)
                    if req.label.is_none() && e.is_duplicate_label() && attempt < LABEL_ATTEMPTS =>
                {
                    debug!("Pool label taken concurrently, picking again ({})", e);
                    attempt += 1;
                }
                result => break result?,
            }
        };

        info!("Profile created: {} ({})", profile.id, profile.label);
        Ok(profile)
    }

    async fn get_profile(&self, id: ProfileId) -> Result<Profile> {
        let mut conn = self.pool.acquire().await?;
        profile_repository::find_by_id(&mut *conn, id)
            .await?
            .ok_or_else(|| CoreError::not_found("profile", id).into())
    }

    async fn find_profile_by_label(&self, label: &str) -> Result<Option<Profile>> {
        let mut conn = self.pool.acquire().await?;
        Ok(profile_repository::find_by_label(&mut *conn, label).await?)
    }

    async fn list_profiles(&self, page: Page) -> Result<Vec<Profile>> {
        let mut conn = self.pool.acquire().await?;
        Ok(profile_repository::list(&mut *conn, page.limit(), page.offset()).await?)
    }

    async fn delete_profile(&self, id: ProfileId) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if !profile_repository::delete(&mut *conn, id).await? {
            return Err(CoreError::not_found("profile", id).into());
        }

        info!("Profile {} deleted", id);
        Ok(())
    }

    async fn create_template(&self, req: CreateTemplate) -> Result<Template> {
        req.validate()?;

        let mut attempt = 1;
        let template = loop {
            match self.insert_template(&req).await {
                // A pool label taken between pick and insert is picked again
                Err(e)
                    if req.label.is_none() && e.is_duplicate_label() && attempt < LABEL_ATTEMPTS =>
                {
                    debug!("Pool label taken concurrently, picking again ({})", e);
                    attempt += 1;
                }
                result => break result?,
            }
        };

        info!(
            "Template created: {} ({}) for profile: {}",
            template.id, template.label, template.profile_id
        );
        Ok(template)
    }

    async fn get_template(&self, id: TemplateId) -> Result<Template> {
        let mut conn = self.pool.acquire().await?;
        template_repository::find_by_id(&mut *conn, id)
            .await?
            .ok_or_else(|| CoreError::not_found("template", id).into())
    }

    async fn list_templates(&self, profile_id: ProfileId) -> Result<Vec<Template>> {
        let mut conn = self.pool.acquire().await?;
        Ok(template_repository::find_by_profile(&mut *conn, profile_id).await?)
    }

    async fn delete_template(&self, id: TemplateId) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if !template_repository::delete(&mut *conn, id).await? {
            return Err(CoreError::not_found("template", id).into());
        }

        info!("Template {} deleted", id);
        Ok(())
    }

    async fn create_calcjob(&self, req: CreateCalcJob) -> Result<(CalcJob, Processing)> {
        req.validate()?;

        let mut tx = self.begin_write().await?;

        // Verify template exists
        if !template_repository::exists(&mut *tx, req.template_id).await? {
            return Err(orphan("calcjob", "template", req.template_id.get()));
        }

        let calcjob = calcjob_repository::create(&mut *tx, &req).await?;
        let processing = processing_repository::create(&mut *tx, calcjob.id).await?;

        tx.commit().await?;

        info!(
            "CalcJob created: {} (uuid {}) for template: {}",
            calcjob.id, calcjob.uuid, calcjob.template_id
        );
        Ok((calcjob, processing))
    }

    async fn get_calcjob(&self, id: CalcJobId) -> Result<CalcJob> {
        let mut conn = self.pool.acquire().await?;
        calcjob_repository::find_by_id(&mut *conn, id)
            .await?
            .ok_or_else(|| CoreError::not_found("calcjob", id).into())
    }

    async fn list_calcjobs(&self, page: Page) -> Result<Vec<CalcJob>> {
        let mut conn = self.pool.acquire().await?;
        Ok(calcjob_repository::list(&mut *conn, page.limit(), page.offset()).await?)
    }

    async fn list_calcjobs_for_template(&self, template_id: TemplateId) -> Result<Vec<CalcJob>> {
        let mut conn = self.pool.acquire().await?;
        Ok(calcjob_repository::find_by_template(&mut *conn, template_id).await?)
    }

    async fn delete_calcjob(&self, id: CalcJobId) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if !calcjob_repository::delete(&mut *conn, id).await? {
            return Err(CoreError::not_found("calcjob", id).into());
        }

        info!("CalcJob {} deleted", id);
        Ok(())
    }

    async fn get_processing(&self, calcjob_id: CalcJobId) -> Result<Processing> {
        let mut conn = self.pool.acquire().await?;
        processing_repository::find_by_calcjob(&mut *conn, calcjob_id)
            .await?
            .ok_or_else(|| CoreError::not_found("processing", calcjob_id).into())
    }

    async fn apply_transition(
        &self,
        calcjob_id: CalcJobId,
        transition: Transition,
    ) -> Result<Processing> {
        let current = self.get_processing(calcjob_id).await?;
        self.apply_transition_from(&current, transition).await
    }

    async fn apply_transition_from(
        &self,
        current: &Processing,
        transition: Transition,
    ) -> Result<Processing> {
        // The guarded UPDATE is a single autocommit statement
        let mut conn = self.pool.acquire().await?;
        let next = persist_transition(&mut *conn, current, &transition).await?;

        log_transition(current, &next);
        Ok(next)
    }

    async fn complete_retrieval(
        &self,
        current: &Processing,
        attributes: Map<String, Value>,
    ) -> Result<(OutputArtifact, Processing)> {
        let calcjob_id = current.calcjob_id;
        let mut tx = self.begin_write().await?;

        let next =
            persist_transition(&mut *tx, current, &Transition::advance(Step::Finalised)).await?;
        let artifact =
            artifact_repository::create(&mut *tx, &CreateArtifact::new(calcjob_id, attributes))
                .await
                .map_err(|e| {
                    insert_error(
                        e,
                        None,
                        Some(orphan_error("artifact", "calcjob", calcjob_id.get())),
                    )
                })?;

        tx.commit().await?;

        info!(
            "Artifact {} created for calcjob: {}",
            artifact.id, artifact.creator_id
        );
        log_transition(current, &next);
        Ok((artifact, next))
    }

    async fn list_unfinished(&self, limit: Option<usize>) -> Result<Vec<Processing>> {
        let limit = limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);

        let mut conn = self.pool.acquire().await?;
        let unfinished = processing_repository::find_unfinished(&mut *conn, limit).await?;

        debug!("Found {} unfinished calcjob(s)", unfinished.len());
        Ok(unfinished)
    }

    async fn count_outcomes(&self) -> Result<OutcomeCounts> {
        let mut conn = self.pool.acquire().await?;
        Ok(processing_repository::count_outcomes(&mut *conn).await?)
    }

    async fn create_artifact(&self, req: CreateArtifact) -> Result<OutputArtifact> {
        let mut tx = self.begin_write().await?;

        // Verify creator exists
        if !calcjob_repository::exists(&mut *tx, req.creator_id).await? {
            return Err(orphan("artifact", "calcjob", req.creator_id.get()));
        }

        let artifact = artifact_repository::create(&mut *tx, &req)
            .await
            .map_err(|e| {
                insert_error(
                    e,
                    None,
                    Some(orphan_error("artifact", "calcjob", req.creator_id.get())),
                )
            })?;

        tx.commit().await?;

        info!(
            "Artifact {} created for calcjob: {}",
            artifact.id, artifact.creator_id
        );
        Ok(artifact)
    }

    async fn list_artifacts(&self, calcjob_id: CalcJobId) -> Result<Vec<OutputArtifact>> {
        let mut conn = self.pool.acquire().await?;
        Ok(artifact_repository::find_by_creator(&mut *conn, calcjob_id).await?)
    }

    async fn load_context(&self, calcjob_id: CalcJobId) -> Result<CalcJobContext> {
        let mut tx = self.pool.begin().await?;

        let calcjob = calcjob_repository::find_by_id(&mut *tx, calcjob_id)
            .await?
            .ok_or_else(|| CoreError::not_found("calcjob", calcjob_id))?;

        let template = template_repository::find_by_id(&mut *tx, calcjob.template_id)
            .await?
            .ok_or_else(|| orphan_error("calcjob", "template", calcjob.template_id.get()))?;

        let profile = profile_repository::find_by_id(&mut *tx, template.profile_id)
            .await?
            .ok_or_else(|| orphan_error("template", "profile", template.profile_id.get()))?;

        let processing = processing_repository::find_by_calcjob(&mut *tx, calcjob_id)
            .await?
            .ok_or_else(|| CoreError::not_found("processing", calcjob_id))?;

        tx.commit().await?;

        Ok(CalcJobContext {
            profile,
            template,
            calcjob,
            processing,
        })
    }
}

/// Validates `transition` against `current` and writes the result only if the
/// stored step still equals `current.step`
async fn persist_transition(
    conn: &mut SqliteConnection,
    current: &Processing,
    transition: &Transition,
) -> Result<Processing> {
    let next = current.apply(transition)?;

    if !processing_repository::compare_and_set(conn, current.step, &next).await? {
        return Err(StoreError::Conflict {
            calcjob_id: current.calcjob_id,
            expected: current.step,
        });
    }

    Ok(next)
}

fn log_transition(current: &Processing, next: &Processing) {
    match &next.failure {
        Some(failure) if current.failure.is_none() => info!(
            "CalcJob {} failed at step {}: {}",
            current.calcjob_id, current.step, failure
        ),
        _ => info!(
            "CalcJob {} {} -> {}",
            current.calcjob_id, current.step, next.step
        ),
    }
}

fn orphan_error(entity: &'static str, owner: &'static str, id: i64) -> CoreError {
    CoreError::OrphanReference { entity, owner, id }
}

fn orphan(entity: &'static str, owner: &'static str, id: i64) -> StoreError {
    orphan_error(entity, owner, id).into()
}
