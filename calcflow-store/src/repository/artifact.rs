//! Artifact Repository
//!
//! Handles all database operations related to output artifacts.

use calcflow_core::domain::OutputArtifact;
use calcflow_core::dto::artifact::CreateArtifact;
use calcflow_core::ids::{ArtifactId, CalcJobId};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use sqlx::types::Json;

/// Create a new artifact
pub async fn create(
    conn: &mut SqliteConnection,
    req: &CreateArtifact,
) -> Result<OutputArtifact, sqlx::Error> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO artifacts (creator_id, attributes, created_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(req.creator_id.get())
    .bind(Json(&req.attributes))
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(OutputArtifact {
        id: ArtifactId(result.last_insert_rowid()),
        creator_id: req.creator_id,
        attributes: req.attributes.clone(),
        created_at: now,
    })
}

/// Find artifacts produced by a calcjob
pub async fn find_by_creator(
    conn: &mut SqliteConnection,
    creator_id: CalcJobId,
) -> Result<Vec<OutputArtifact>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ArtifactRow>(
        r#"
        SELECT id, creator_id, attributes, created_at
        FROM artifacts
        WHERE creator_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(creator_id.get())
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    id: i64,
    creator_id: i64,
    attributes: Json<serde_json::Map<String, serde_json::Value>>,
    created_at: DateTime<Utc>,
}

impl From<ArtifactRow> for OutputArtifact {
    fn from(row: ArtifactRow) -> Self {
        OutputArtifact {
            id: ArtifactId(row.id),
            creator_id: CalcJobId(row.creator_id),
            attributes: row.attributes.0,
            created_at: row.created_at,
        }
    }
}
