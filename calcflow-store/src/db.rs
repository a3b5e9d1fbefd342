//! Database pool and schema

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Opens a pool on a SQLite database URL, creating the file if missing
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}

/// Opens a private in-memory database
///
/// The pool holds exactly one connection that never expires, since the
/// database vanishes with it.
pub async fn create_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // AUTOINCREMENT keeps ids from ever being reused after deletes
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL UNIQUE,
            gateway_url TEXT NOT NULL,
            client_id TEXT NOT NULL,
            client_secret TEXT NOT NULL,
            token_uri TEXT NOT NULL,
            machine_name TEXT NOT NULL,
            work_dir TEXT NOT NULL,
            fs_convention TEXT NOT NULL DEFAULT 'posix'
                CHECK (fs_convention IN ('posix', 'windows')),
            small_file_size_bytes INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_id INTEGER NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
            label TEXT NOT NULL,
            script TEXT NOT NULL,
            upload TEXT NOT NULL DEFAULT '{}',
            UNIQUE (profile_id, label)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS calcjobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            template_id INTEGER NOT NULL REFERENCES templates(id) ON DELETE CASCADE,
            label TEXT NOT NULL DEFAULT '',
            uuid TEXT NOT NULL UNIQUE,
            parameters TEXT NOT NULL DEFAULT '{}',
            upload TEXT NOT NULL DEFAULT '{}',
            download_globs TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processing (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            calcjob_id INTEGER NOT NULL UNIQUE REFERENCES calcjobs(id) ON DELETE CASCADE,
            step TEXT NOT NULL DEFAULT 'created'
                CHECK (step IN ('created', 'uploading', 'submitting', 'running', 'retrieving', 'finalised')),
            job_id TEXT,
            failure TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            creator_id INTEGER NOT NULL REFERENCES calcjobs(id) ON DELETE CASCADE,
            attributes TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for ownership lookups and the unfinished scan
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_templates_profile_id ON templates(profile_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_calcjobs_template_id ON calcjobs(template_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_processing_step ON processing(step)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artifacts_creator_id ON artifacts(creator_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
