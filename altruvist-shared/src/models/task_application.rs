/// Volunteer applications to tasks
///
/// # Schema
///
/// ```sql
/// CREATE TYPE application_status AS ENUM ('PENDING', 'ACCEPTED', 'REJECTED', 'WITHDRAWN');
///
/// CREATE TABLE task_applications (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     task_id UUID NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     charity_id UUID REFERENCES charities(id) ON DELETE SET NULL,
///     status application_status NOT NULL DEFAULT 'PENDING',
///     message TEXT,
///     volunteer_wallet_address TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (task_id, user_id)
/// );
/// ```
///
/// Every review action (accept, reject, withdraw, undo, remove volunteer) is
/// a status change through [`TaskApplication::update_status`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

const APPLICATION_COLUMNS: &str = "id, task_id, user_id, charity_id, status, message, \
     volunteer_wallet_address, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "application_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 4] = [
        ApplicationStatus::Pending,
        ApplicationStatus::Accepted,
        ApplicationStatus::Rejected,
        ApplicationStatus::Withdrawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "PENDING",
            ApplicationStatus::Accepted => "ACCEPTED",
            ApplicationStatus::Rejected => "REJECTED",
            ApplicationStatus::Withdrawn => "WITHDRAWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskApplication {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub charity_id: Option<Uuid>,
    pub status: ApplicationStatus,

    /// Cover note from the volunteer
    pub message: Option<String>,

    pub volunteer_wallet_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskApplication {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub charity_id: Option<Uuid>,
    pub message: Option<String>,
    pub volunteer_wallet_address: Option<String>,
}

/// Application joined with the applicant's profile summary
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApplicationWithApplicant {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub application: TaskApplication,
    pub applicant_name: String,
    pub applicant_email: String,
    pub applicant_title: Option<String>,
    pub applicant_skills: Vec<String>,
    pub applicant_picture: Option<String>,
}

#[derive(Debug, Error)]
pub enum TaskApplicationError {
    #[error("User has already applied for this task")]
    AlreadyApplied,

    #[error("Task not found")]
    TaskNotFound,

    #[error("Task application not found")]
    NotFound,

    #[error("No volunteer spots remaining for this task")]
    NoSpotsRemaining,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl TaskApplication {
    pub fn is_pending(&self) -> bool {
        self.status == ApplicationStatus::Pending
    }

    /// Submits an application in PENDING
    pub async fn apply(
        pool: &PgPool,
        data: CreateTaskApplication,
    ) -> Result<Self, TaskApplicationError> {
        let query = format!(
            r#"
            INSERT INTO task_applications
                (task_id, user_id, charity_id, message, volunteer_wallet_address)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {APPLICATION_COLUMNS}
            "#
        );

        let result = sqlx::query_as::<_, TaskApplication>(&query)
            .bind(data.task_id)
            .bind(data.user_id)
            .bind(data.charity_id)
            .bind(data.message)
            .bind(data.volunteer_wallet_address)
            .fetch_one(pool)
            .await;

        match result {
            Ok(application) => Ok(application),
            Err(e) if is_unique_violation(&e) => Err(TaskApplicationError::AlreadyApplied),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(TaskApplicationError::TaskNotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {APPLICATION_COLUMNS} FROM task_applications WHERE id = $1");
        sqlx::query_as::<_, TaskApplication>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_many(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Self>, sqlx::Error> {
        let query =
            format!("SELECT {APPLICATION_COLUMNS} FROM task_applications WHERE id = ANY($1)");
        sqlx::query_as::<_, TaskApplication>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Applications for one task, oldest first
    pub async fn list_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {APPLICATION_COLUMNS} FROM task_applications WHERE task_id = $1 ORDER BY created_at"
        );
        sqlx::query_as::<_, TaskApplication>(&query)
            .bind(task_id)
            .fetch_all(pool)
            .await
    }

    /// Applications for several tasks in one round trip
    pub async fn list_for_tasks(
        pool: &PgPool,
        task_ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT {APPLICATION_COLUMNS} FROM task_applications WHERE task_id = ANY($1) ORDER BY created_at"
        );
        sqlx::query_as::<_, TaskApplication>(&query)
            .bind(task_ids)
            .fetch_all(pool)
            .await
    }

    /// Applications for one task with applicant details
    pub async fn list_with_applicants(
        pool: &PgPool,
        task_id: Uuid,
    ) -> Result<Vec<ApplicationWithApplicant>, sqlx::Error> {
        sqlx::query_as::<_, ApplicationWithApplicant>(
            r#"
            SELECT a.id, a.task_id, a.user_id, a.charity_id, a.status, a.message,
                   a.volunteer_wallet_address, a.created_at, a.updated_at,
                   u.name AS applicant_name, u.email AS applicant_email,
                   u.user_title AS applicant_title, u.skills AS applicant_skills,
                   u.profile_picture AS applicant_picture
            FROM task_applications a
            JOIN users u ON u.id = a.user_id
            WHERE a.task_id = $1
            ORDER BY a.created_at
            "#,
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_accepted(pool: &PgPool, task_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM task_applications WHERE task_id = $1 AND status = 'ACCEPTED'",
        )
        .bind(task_id)
        .fetch_one(pool)
        .await
    }

    /// Moves an application to `new_status`.
    ///
    /// Accepting requires a free spot: fewer ACCEPTED applications than the
    /// task's `volunteers_needed`. The task row is locked while counting so
    /// concurrent accepts cannot overfill it.
    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        new_status: ApplicationStatus,
    ) -> Result<Self, TaskApplicationError> {
        let mut tx = pool.begin().await?;

        let task_id: Uuid =
            sqlx::query_scalar("SELECT task_id FROM task_applications WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(TaskApplicationError::NotFound)?;

        if new_status == ApplicationStatus::Accepted {
            let volunteers_needed: i32 =
                sqlx::query_scalar("SELECT volunteers_needed FROM tasks WHERE id = $1 FOR UPDATE")
                    .bind(task_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(TaskApplicationError::TaskNotFound)?;

            let accepted: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM task_applications \
                 WHERE task_id = $1 AND status = 'ACCEPTED' AND id <> $2",
            )
            .bind(task_id)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

            if accepted >= i64::from(volunteers_needed) {
                return Err(TaskApplicationError::NoSpotsRemaining);
            }
        }

        let query = format!(
            r#"
            UPDATE task_applications
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {APPLICATION_COLUMNS}
            "#
        );
        let application = sqlx::query_as::<_, TaskApplication>(&query)
            .bind(id)
            .bind(new_status)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            application_id = %id,
            task_id = %task_id,
            status = new_status.as_str(),
            "Task application status updated"
        );

        Ok(application)
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM task_applications WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
