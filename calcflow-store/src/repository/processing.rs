//! Processing Repository
//!
//! Handles all database operations related to execution status records.

use calcflow_core::domain::{Outcome, OutcomeCounts, Processing, Step};
use calcflow_core::ids::{CalcJobId, ProcessingId};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::decode_error;

/// Create the initial `created` status of a calcjob
pub async fn create(
    conn: &mut SqliteConnection,
    calcjob_id: CalcJobId,
) -> Result<Processing, sqlx::Error> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO processing (calcjob_id, step, updated_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(calcjob_id.get())
    .bind(Step::Created.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let mut processing = Processing::created(ProcessingId(result.last_insert_rowid()), calcjob_id);
    processing.updated_at = now;
    Ok(processing)
}

/// Find the status of a calcjob
pub async fn find_by_calcjob(
    conn: &mut SqliteConnection,
    calcjob_id: CalcJobId,
) -> Result<Option<Processing>, sqlx::Error> {
    let row = sqlx::query_as::<_, ProcessingRow>(
        r#"
        SELECT id, calcjob_id, step, job_id, failure, updated_at
        FROM processing
        WHERE calcjob_id = ?
        "#,
    )
    .bind(calcjob_id.get())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Processing::try_from).transpose()
}

/// Write a new snapshot only if the stored step still equals `expected`
///
/// Step, job id and failure change in a single statement.
///
/// # Returns
/// `false` when the row moved on since it was read
pub async fn compare_and_set(
    conn: &mut SqliteConnection,
    expected: Step,
    next: &Processing,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE processing
        SET step = ?, job_id = ?, failure = ?, updated_at = ?
        WHERE calcjob_id = ? AND step = ?
        "#,
    )
    .bind(next.step.as_str())
    .bind(&next.job_id)
    .bind(&next.failure)
    .bind(next.updated_at)
    .bind(next.calcjob_id.get())
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Find statuses that are not finalised, oldest calcjob first
///
/// A negative limit means no limit.
pub async fn find_unfinished(
    conn: &mut SqliteConnection,
    limit: i64,
) -> Result<Vec<Processing>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ProcessingRow>(
        r#"
        SELECT id, calcjob_id, step, job_id, failure, updated_at
        FROM processing
        WHERE step != ? AND failure IS NULL
        ORDER BY calcjob_id ASC
        LIMIT ?
        "#,
    )
    .bind(Step::Finalised.as_str())
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(Processing::try_from).collect()
}

/// Count statuses per outcome
pub async fn count_outcomes(conn: &mut SqliteConnection) -> Result<OutcomeCounts, sqlx::Error> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT CASE
                   WHEN step != 'finalised' THEN 'in_progress'
                   WHEN failure IS NULL THEN 'succeeded'
                   ELSE 'failed'
               END AS outcome,
               COUNT(*)
        FROM processing
        GROUP BY outcome
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut counts = OutcomeCounts::default();
    for (outcome, count) in rows {
        let outcome = match outcome.as_str() {
            "succeeded" => Outcome::Succeeded,
            "failed" => Outcome::Failed,
            _ => Outcome::InProgress,
        };
        counts.add(outcome, u64::try_from(count).unwrap_or(0));
    }

    Ok(counts)
}

#[derive(sqlx::FromRow)]
struct ProcessingRow {
    id: i64,
    calcjob_id: i64,
    step: String,
    job_id: Option<String>,
    failure: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProcessingRow> for Processing {
    type Error = sqlx::Error;

    fn try_from(row: ProcessingRow) -> Result<Self, Self::Error> {
        Ok(Processing {
            id: ProcessingId(row.id),
            calcjob_id: CalcJobId(row.calcjob_id),
            step: row.step.parse().map_err(decode_error)?,
            job_id: row.job_id,
            failure: row.failure,
            updated_at: row.updated_at,
        })
    }
}
