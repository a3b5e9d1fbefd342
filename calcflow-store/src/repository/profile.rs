//! Profile Repository
//!
//! Handles all database operations related to connection profiles.

use calcflow_core::domain::{Credentials, Profile};
use calcflow_core::dto::profile::CreateProfile;
use calcflow_core::ids::ProfileId;
use sqlx::SqliteConnection;
use std::collections::BTreeSet;

use super::decode_error;

/// Insert a profile under an already resolved label
pub async fn create(
    conn: &mut SqliteConnection,
    label: &str,
    req: &CreateProfile,
) -> Result<Profile, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO profiles (label, gateway_url, client_id, client_secret, token_uri,
                              machine_name, work_dir, fs_convention, small_file_size_bytes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(label)
    .bind(&req.gateway_url)
    .bind(&req.credentials.client_id)
    .bind(&req.credentials.client_secret)
    .bind(&req.credentials.token_uri)
    .bind(&req.machine_name)
    .bind(&req.work_dir)
    .bind(req.fs_convention.as_str())
    .bind(i64::try_from(req.small_file_size_bytes).unwrap_or(i64::MAX))
    .execute(&mut *conn)
    .await?;

    Ok(Profile {
        id: ProfileId(result.last_insert_rowid()),
        label: label.to_string(),
        gateway_url: req.gateway_url.clone(),
        credentials: req.credentials.clone(),
        machine_name: req.machine_name.clone(),
        work_dir: req.work_dir.clone(),
        fs_convention: req.fs_convention,
        small_file_size_bytes: req.small_file_size_bytes,
    })
}

/// Find a profile by ID
pub async fn find_by_id(
    conn: &mut SqliteConnection,
    id: ProfileId,
) -> Result<Option<Profile>, sqlx::Error> {
    let row = sqlx::query_as::<_, ProfileRow>(
        r#"
        SELECT id, label, gateway_url, client_id, client_secret, token_uri,
               machine_name, work_dir, fs_convention, small_file_size_bytes
        FROM profiles
        WHERE id = ?
        "#,
    )
    .bind(id.get())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Profile::try_from).transpose()
}

/// Find a profile by its unique label
pub async fn find_by_label(
    conn: &mut SqliteConnection,
    label: &str,
) -> Result<Option<Profile>, sqlx::Error> {
    let row = sqlx::query_as::<_, ProfileRow>(
        r#"
        SELECT id, label, gateway_url, client_id, client_secret, token_uri,
               machine_name, work_dir, fs_convention, small_file_size_bytes
        FROM profiles
        WHERE label = ?
        "#,
    )
    .bind(label)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Profile::try_from).transpose()
}

/// List profiles ordered by ID
pub async fn list(
    conn: &mut SqliteConnection,
    limit: i64,
    offset: i64,
) -> Result<Vec<Profile>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ProfileRow>(
        r#"
        SELECT id, label, gateway_url, client_id, client_secret, token_uri,
               machine_name, work_dir, fs_convention, small_file_size_bytes
        FROM profiles
        ORDER BY id ASC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(Profile::try_from).collect()
}

/// All labels currently taken
pub async fn labels(conn: &mut SqliteConnection) -> Result<BTreeSet<String>, sqlx::Error> {
    let labels: Vec<String> = sqlx::query_scalar("SELECT label FROM profiles")
        .fetch_all(&mut *conn)
        .await?;

    Ok(labels.into_iter().collect())
}

pub async fn exists(conn: &mut SqliteConnection, id: ProfileId) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM profiles WHERE id = ?")
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(found.is_some())
}

/// Delete a profile; templates and everything below them cascade
pub async fn delete(conn: &mut SqliteConnection, id: ProfileId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM profiles WHERE id = ?")
        .bind(id.get())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

// Helper struct for database rows
#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: i64,
    label: String,
    gateway_url: String,
    client_id: String,
    client_secret: String,
    token_uri: String,
    machine_name: String,
    work_dir: String,
    fs_convention: String,
    small_file_size_bytes: i64,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = sqlx::Error;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Profile {
            id: ProfileId(row.id),
            label: row.label,
            gateway_url: row.gateway_url,
            credentials: Credentials {
                client_id: row.client_id,
                client_secret: row.client_secret,
                token_uri: row.token_uri,
            },
            machine_name: row.machine_name,
            work_dir: row.work_dir,
            fs_convention: row.fs_convention.parse().map_err(decode_error)?,
            small_file_size_bytes: u64::try_from(row.small_file_size_bytes).map_err(decode_error)?,
        })
    }
}
