//! CalcJob Repository
//!
//! Handles all database operations related to job invocations.

use calcflow_core::domain::CalcJob;
use calcflow_core::dto::calcjob::CreateCalcJob;
use calcflow_core::ids::{CalcJobId, TemplateId};
use calcflow_core::manifest::{DownloadGlobs, UploadManifest};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use sqlx::types::Json;
use uuid::Uuid;

use super::decode_error;

/// Create a new calcjob with a freshly generated remote folder uuid
pub async fn create(conn: &mut SqliteConnection, req: &CreateCalcJob) -> Result<CalcJob, sqlx::Error> {
    let uuid = Uuid::new_v4();
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO calcjobs (template_id, label, uuid, parameters, upload, download_globs, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(req.template_id.get())
    .bind(&req.label)
    .bind(uuid.to_string())
    .bind(Json(&req.parameters))
    .bind(Json(&req.upload))
    .bind(Json(&req.download_globs))
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(CalcJob {
        id: CalcJobId(result.last_insert_rowid()),
        template_id: req.template_id,
        label: req.label.clone(),
        uuid,
        parameters: req.parameters.clone(),
        upload: req.upload.clone(),
        download_globs: req.download_globs.clone(),
        created_at: now,
    })
}

/// Find a calcjob by ID
pub async fn find_by_id(
    conn: &mut SqliteConnection,
    id: CalcJobId,
) -> Result<Option<CalcJob>, sqlx::Error> {
    let row = sqlx::query_as::<_, CalcJobRow>(
        r#"
        SELECT id, template_id, label, uuid, parameters, upload, download_globs, created_at
        FROM calcjobs
        WHERE id = ?
        "#,
    )
    .bind(id.get())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(CalcJob::try_from).transpose()
}

/// Find calcjobs of a template
pub async fn find_by_template(
    conn: &mut SqliteConnection,
    template_id: TemplateId,
) -> Result<Vec<CalcJob>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CalcJobRow>(
        r#"
        SELECT id, template_id, label, uuid, parameters, upload, download_globs, created_at
        FROM calcjobs
        WHERE template_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(template_id.get())
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(CalcJob::try_from).collect()
}

/// List calcjobs, newest first
pub async fn list(
    conn: &mut SqliteConnection,
    limit: i64,
    offset: i64,
) -> Result<Vec<CalcJob>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CalcJobRow>(
        r#"
        SELECT id, template_id, label, uuid, parameters, upload, download_globs, created_at
        FROM calcjobs
        ORDER BY id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(CalcJob::try_from).collect()
}

pub async fn exists(conn: &mut SqliteConnection, id: CalcJobId) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM calcjobs WHERE id = ?")
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(found.is_some())
}

/// Delete a calcjob; its status and artifacts cascade
pub async fn delete(conn: &mut SqliteConnection, id: CalcJobId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM calcjobs WHERE id = ?")
        .bind(id.get())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[derive(sqlx::FromRow)]
struct CalcJobRow {
    id: i64,
    template_id: i64,
    label: String,
    uuid: String,
    parameters: Json<serde_json::Map<String, serde_json::Value>>,
    upload: Json<UploadManifest>,
    download_globs: Json<DownloadGlobs>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CalcJobRow> for CalcJob {
    type Error = sqlx::Error;

    fn try_from(row: CalcJobRow) -> Result<Self, Self::Error> {
        Ok(CalcJob {
            id: CalcJobId(row.id),
            template_id: TemplateId(row.template_id),
            label: row.label,
            uuid: Uuid::parse_str(&row.uuid).map_err(decode_error)?,
            parameters: row.parameters.0,
            upload: row.upload.0,
            download_globs: row.download_globs.0,
            created_at: row.created_at,
        })
    }
}
