/// Applications to join a charity in a role that needs approval
///
/// Supporter roles join directly through [`CharityMembership::create`]. Roles
/// such as admin or coordinator go through an application that an existing
/// admin reviews. Accepting an application creates (or extends) the
/// membership in the same transaction.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE charity_application_status AS ENUM ('PENDING', 'ACCEPTED', 'REJECTED');
///
/// CREATE TABLE charity_applications (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     charity_id UUID NOT NULL REFERENCES charities(id) ON DELETE CASCADE,
///     roles TEXT[] NOT NULL DEFAULT '{}',
///     application_note TEXT,
///     status charity_application_status NOT NULL DEFAULT 'PENDING',
///     review_note TEXT,
///     reviewed_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     reviewed_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::membership::{CharityMembership, CreateMembership};

const APPLICATION_COLUMNS: &str = "id, user_id, charity_id, roles, application_note, status, \
     review_note, reviewed_by, reviewed_at, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "charity_application_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CharityApplicationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl CharityApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CharityApplicationStatus::Pending => "PENDING",
            CharityApplicationStatus::Accepted => "ACCEPTED",
            CharityApplicationStatus::Rejected => "REJECTED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CharityApplication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub charity_id: Uuid,

    /// Roles requested by the applicant
    pub roles: Vec<String>,

    pub application_note: Option<String>,
    pub status: CharityApplicationStatus,
    pub review_note: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCharityApplication {
    pub user_id: Uuid,
    pub charity_id: Uuid,
    pub roles: Vec<String>,
    pub application_note: Option<String>,
}

/// Outcome of reviewing an application
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub application: CharityApplication,

    /// Present when the application was accepted
    pub membership: Option<CharityMembership>,
}

#[derive(Debug, Error)]
pub enum ApplicationReviewError {
    #[error("Application not found")]
    NotFound,

    #[error("Application has already been reviewed")]
    AlreadyReviewed,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CharityApplication {
    /// Submits an application.
    ///
    /// A second pending application for the same user and charity violates
    /// the partial unique index and surfaces as a unique-constraint error.
    pub async fn create(pool: &PgPool, data: CreateCharityApplication) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO charity_applications (user_id, charity_id, roles, application_note)
            VALUES ($1, $2, $3, $4)
            RETURNING {APPLICATION_COLUMNS}
            "#
        );

        sqlx::query_as::<_, CharityApplication>(&query)
            .bind(data.user_id)
            .bind(data.charity_id)
            .bind(data.roles)
            .bind(data.application_note)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query =
            format!("SELECT {APPLICATION_COLUMNS} FROM charity_applications WHERE id = $1");
        sqlx::query_as::<_, CharityApplication>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Applications for a charity, optionally filtered by status, newest first
    pub async fn list_for_charity(
        pool: &PgPool,
        charity_id: Uuid,
        status: Option<CharityApplicationStatus>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {APPLICATION_COLUMNS}
            FROM charity_applications
            WHERE charity_id = $1 AND ($2::charity_application_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            "#
        );
        sqlx::query_as::<_, CharityApplication>(&query)
            .bind(charity_id)
            .bind(status)
            .fetch_all(pool)
            .await
    }

    /// Accepts or rejects a pending application.
    ///
    /// The row is locked for the duration of the review so two admins cannot
    /// both act on it.
    pub async fn review(
        pool: &PgPool,
        id: Uuid,
        reviewer: Uuid,
        status: CharityApplicationStatus,
        review_note: Option<String>,
    ) -> Result<ReviewOutcome, ApplicationReviewError> {
        let mut tx = pool.begin().await?;

        let lock_query = format!(
            "SELECT {APPLICATION_COLUMNS} FROM charity_applications WHERE id = $1 FOR UPDATE"
        );
        let current = sqlx::query_as::<_, CharityApplication>(&lock_query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ApplicationReviewError::NotFound)?;

        if current.status != CharityApplicationStatus::Pending {
            return Err(ApplicationReviewError::AlreadyReviewed);
        }

        let update_query = format!(
            r#"
            UPDATE charity_applications
            SET status = $2, review_note = $3, reviewed_by = $4,
                reviewed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {APPLICATION_COLUMNS}
            "#
        );
        let application = sqlx::query_as::<_, CharityApplication>(&update_query)
            .bind(id)
            .bind(status)
            .bind(review_note)
            .bind(reviewer)
            .fetch_one(&mut *tx)
            .await?;

        let membership = if status == CharityApplicationStatus::Accepted {
            Some(
                CharityMembership::create(
                    &mut *tx,
                    CreateMembership {
                        user_id: application.user_id,
                        charity_id: application.charity_id,
                        roles: application.roles.clone(),
                        permissions: Vec::new(),
                    },
                )
                .await?,
            )
        } else {
            None
        };

        tx.commit().await?;

        tracing::info!(
            application_id = %id,
            reviewer = %reviewer,
            status = status.as_str(),
            "Charity application reviewed"
        );

        Ok(ReviewOutcome {
            application,
            membership,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_as_str() {
        assert_eq!(CharityApplicationStatus::Pending.as_str(), "PENDING");
        assert_eq!(CharityApplicationStatus::Accepted.as_str(), "ACCEPTED");
        assert_eq!(CharityApplicationStatus::Rejected.as_str(), "REJECTED");
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&CharityApplicationStatus::Accepted).unwrap();
        assert_eq!(json, "\"ACCEPTED\"");
        let parsed: CharityApplicationStatus = serde_json::from_str("\"REJECTED\"").unwrap();
        assert_eq!(parsed, CharityApplicationStatus::Rejected);
    }
}
