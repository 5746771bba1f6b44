/// Outbox queue
///
/// Claims due jobs from `outbox_jobs` and records their outcome.
///
/// # Lifecycle
///
/// ```text
/// pending ──claim──> running ──mark_done──> done
///    ^                  │
///    └──mark_failed─────┤  (attempts < max, retried after 2^attempts s, capped at 300 s)
///                       └──mark_failed / abandon──> failed
/// ```
///
/// Claims use `FOR UPDATE SKIP LOCKED`, so several workers can poll the same
/// table without taking the same row.
///
/// # Example
///
/// ```no_run
/// use altruvist_worker::queue::OutboxQueue;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let queue = OutboxQueue::new(pool);
///
/// for job in queue.claim(5).await? {
///     println!("Claimed {} ({})", job.id, job.kind);
///     queue.mark_done(job.id).await?;
/// }
/// # Ok(())
/// # }
/// ```

use altruvist_shared::models::outbox::{OutboxJob, OutboxStatus, OUTBOX_COLUMNS};
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Longest delay between two attempts of a job
pub const MAX_BACKOFF_SECS: i64 = 300;

const RETURNING_COLUMNS: &str = "outbox_jobs.id, outbox_jobs.kind, outbox_jobs.payload, \
     outbox_jobs.status, outbox_jobs.attempts, outbox_jobs.last_error, outbox_jobs.run_after, \
     outbox_jobs.created_at, outbox_jobs.updated_at";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The job is gone or is not running
    #[error("Job not running: {0}")]
    JobNotRunning(Uuid),
}

#[derive(Clone)]
pub struct OutboxQueue {
    db: PgPool,
}

impl OutboxQueue {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Claims up to `limit` due jobs, oldest first.
    ///
    /// Claimed rows move to `running` and their `attempts` counter goes up
    /// by one, so the returned jobs carry the number of the current attempt.
    pub async fn claim(&self, limit: usize) -> Result<Vec<OutboxJob>, QueueError> {
        let query = format!(
            r#"
            WITH due AS (
                SELECT id
                FROM outbox_jobs
                WHERE status = $1 AND run_after <= NOW()
                ORDER BY run_after ASC, created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE outbox_jobs
            SET
                status = $3,
                attempts = outbox_jobs.attempts + 1,
                updated_at = NOW()
            FROM due
            WHERE outbox_jobs.id = due.id
            RETURNING {RETURNING_COLUMNS}
            "#
        );

        let jobs = sqlx::query_as::<_, OutboxJob>(&query)
            .bind(OutboxStatus::Pending)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(OutboxStatus::Running)
            .fetch_all(&self.db)
            .await?;

        if !jobs.is_empty() {
            tracing::debug!(count = jobs.len(), "Claimed outbox jobs");
        }

        Ok(jobs)
    }

    pub async fn mark_done(&self, id: Uuid) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_jobs
            SET status = $2, last_error = NULL, updated_at = NOW()
            WHERE id = $1 AND status = $3
            "#,
        )
        .bind(id)
        .bind(OutboxStatus::Done)
        .bind(OutboxStatus::Running)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotRunning(id));
        }
        Ok(())
    }

    /// Records a failed attempt.
    ///
    /// The job goes back to `pending` with `run_after` pushed out by
    /// `2^attempts` seconds (at most [`MAX_BACKOFF_SECS`]), or to `failed`
    /// once `attempts` reaches `max_attempts`. Returns the new status.
    pub async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        max_attempts: i32,
    ) -> Result<OutboxStatus, QueueError> {
        let status: Option<OutboxStatus> = sqlx::query_scalar(
            r#"
            UPDATE outbox_jobs
            SET
                status = CASE WHEN attempts >= $3 THEN $4 ELSE $5 END,
                run_after = NOW() + make_interval(secs => LEAST(POWER(2, attempts), $6)::double precision),
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = $7
            RETURNING status
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(max_attempts)
        .bind(OutboxStatus::Failed)
        .bind(OutboxStatus::Pending)
        .bind(MAX_BACKOFF_SECS)
        .bind(OutboxStatus::Running)
        .fetch_optional(&self.db)
        .await?;

        let status = status.ok_or(QueueError::JobNotRunning(id))?;
        match status {
            OutboxStatus::Failed => {
                tracing::error!(job_id = %id, error, "Outbox job failed permanently")
            }
            _ => tracing::warn!(job_id = %id, error, "Outbox job failed, will retry"),
        }
        Ok(status)
    }

    /// Marks a job failed without further attempts
    pub async fn abandon(&self, id: Uuid, error: &str) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_jobs
            SET status = $3, last_error = $2, updated_at = NOW()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(OutboxStatus::Failed)
        .bind(OutboxStatus::Running)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotRunning(id));
        }

        tracing::error!(job_id = %id, error, "Outbox job abandoned");
        Ok(())
    }

    /// Returns `running` jobs not updated within `older_than` to `pending`.
    ///
    /// A worker that dies mid-job leaves its rows running; this hands them to
    /// the next poll. The attempt they were on still counts.
    pub async fn release_stale(&self, older_than: Duration) -> Result<u64, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_jobs
            SET status = $1, updated_at = NOW()
            WHERE status = $2 AND updated_at < NOW() - make_interval(secs => $3)
            "#,
        )
        .bind(OutboxStatus::Pending)
        .bind(OutboxStatus::Running)
        .bind(older_than.as_secs_f64())
        .execute(&self.db)
        .await?;

        let released = result.rows_affected();
        if released > 0 {
            tracing::warn!(count = released, "Released stale outbox jobs");
        }
        Ok(released)
    }

    /// Jobs waiting to run, due or not
    pub async fn pending_count(&self) -> Result<i64, QueueError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox_jobs WHERE status = $1")
            .bind(OutboxStatus::Pending)
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<OutboxJob>, QueueError> {
        let query = format!("SELECT {OUTBOX_COLUMNS} FROM outbox_jobs WHERE id = $1");
        let job = sqlx::query_as::<_, OutboxJob>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(job)
    }
}
