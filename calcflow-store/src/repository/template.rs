//! Template Repository
//!
//! Handles all database operations related to executable templates.

use calcflow_core::domain::Template;
use calcflow_core::dto::template::CreateTemplate;
use calcflow_core::ids::{ProfileId, TemplateId};
use calcflow_core::manifest::UploadManifest;
use sqlx::SqliteConnection;
use sqlx::types::Json;
use std::collections::BTreeSet;

/// Insert a template under an already resolved label
pub async fn create(
    conn: &mut SqliteConnection,
    label: &str,
    req: &CreateTemplate,
) -> Result<Template, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO templates (profile_id, label, script, upload)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(req.profile_id.get())
    .bind(label)
    .bind(&req.script)
    .bind(Json(&req.upload))
    .execute(&mut *conn)
    .await?;

    Ok(Template {
        id: TemplateId(result.last_insert_rowid()),
        profile_id: req.profile_id,
        label: label.to_string(),
        script: req.script.clone(),
        upload: req.upload.clone(),
    })
}

/// Find a template by ID
pub async fn find_by_id(
    conn: &mut SqliteConnection,
    id: TemplateId,
) -> Result<Option<Template>, sqlx::Error> {
    let row = sqlx::query_as::<_, TemplateRow>(
        r#"
        SELECT id, profile_id, label, script, upload
        FROM templates
        WHERE id = ?
        "#,
    )
    .bind(id.get())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find templates owned by a profile
pub async fn find_by_profile(
    conn: &mut SqliteConnection,
    profile_id: ProfileId,
) -> Result<Vec<Template>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TemplateRow>(
        r#"
        SELECT id, profile_id, label, script, upload
        FROM templates
        WHERE profile_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(profile_id.get())
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Labels taken within one profile
pub async fn labels_for_profile(
    conn: &mut SqliteConnection,
    profile_id: ProfileId,
) -> Result<BTreeSet<String>, sqlx::Error> {
    let labels: Vec<String> = sqlx::query_scalar("SELECT label FROM templates WHERE profile_id = ?")
        .bind(profile_id.get())
        .fetch_all(&mut *conn)
        .await?;

    Ok(labels.into_iter().collect())
}

pub async fn exists(conn: &mut SqliteConnection, id: TemplateId) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM templates WHERE id = ?")
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(found.is_some())
}

/// Delete a template; its calcjobs cascade
pub async fn delete(conn: &mut SqliteConnection, id: TemplateId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM templates WHERE id = ?")
        .bind(id.get())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: i64,
    profile_id: i64,
    label: String,
    script: String,
    upload: Json<UploadManifest>,
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Template {
            id: TemplateId(row.id),
            profile_id: ProfileId(row.profile_id),
            label: row.label,
            script: row.script,
            upload: row.upload.0,
        }
    }
}
