/// Charity model and database operations
///
/// # Schema
///
/// ```sql
/// CREATE TABLE charities (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name TEXT NOT NULL,
///     description TEXT NOT NULL,
///     website TEXT,
///     contact_email TEXT,
///     tags TEXT[] NOT NULL DEFAULT '{}',
///     background_picture TEXT,
///     notify_topic_ids TEXT[] NOT NULL DEFAULT '{}',
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Every charity owns two notification topics, one for its admins and one for
/// its coordinators. Their keys are derived from the charity id and stored in
/// `notify_topic_ids` at creation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::integrations::notifications::topics;

const CHARITY_COLUMNS: &str = "id, name, description, website, contact_email, tags, \
     background_picture, notify_topic_ids, created_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Charity {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub website: Option<String>,
    pub contact_email: Option<String>,

    /// Cause categories, e.g. "Healthcare" or "Climate Action"
    pub tags: Vec<String>,

    pub background_picture: Option<String>,

    /// Notification topic keys owned by this charity
    pub notify_topic_ids: Vec<String>,

    /// Creating user; cleared if that account is deleted
    pub created_by: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCharity {
    #[validate(length(min = 2, message = "Charity name must be at least 2 characters long"))]
    pub name: String,

    #[validate(length(
        min = 10,
        message = "Charity description must be at least 10 characters long"
    ))]
    pub description: String,

    #[validate(url(message = "Please enter a valid URL"))]
    pub website: Option<String>,

    #[validate(email(message = "Please input a valid contact email"))]
    pub contact_email: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub background_picture: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateCharity {
    #[validate(length(min = 2, message = "Charity name must be at least 2 characters long"))]
    pub name: Option<String>,

    #[validate(length(
        min = 10,
        message = "Charity description must be at least 10 characters long"
    ))]
    pub description: Option<String>,

    #[validate(url(message = "Please enter a valid URL"))]
    pub website: Option<String>,

    #[validate(email(message = "Please input a valid contact email"))]
    pub contact_email: Option<String>,

    pub tags: Option<Vec<String>>,
    pub background_picture: Option<String>,
}

impl Charity {
    /// Admin topic key, if recorded
    pub fn admins_topic(&self) -> Option<&str> {
        self.notify_topic_ids
            .iter()
            .find(|id| id.contains("admins"))
            .map(String::as_str)
    }

    /// Inserts the charity with its topic keys already assigned.
    ///
    /// The caller is responsible for the creator's admin membership; use a
    /// transaction so both rows land together.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        data: CreateCharity,
        created_by: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        let topic_ids = vec![topics::charity_admins(id), topics::charity_coordinators(id)];

        let query = format!(
            r#"
            INSERT INTO charities
                (id, name, description, website, contact_email, tags, background_picture,
                 notify_topic_ids, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {CHARITY_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Charity>(&query)
            .bind(id)
            .bind(data.name)
            .bind(data.description)
            .bind(data.website)
            .bind(data.contact_email)
            .bind(data.tags)
            .bind(data.background_picture)
            .bind(topic_ids)
            .bind(created_by)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {CHARITY_COLUMNS} FROM charities WHERE id = $1");
        sqlx::query_as::<_, Charity>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lists charities, newest first
    pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {CHARITY_COLUMNS} FROM charities ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, Charity>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Charities the user belongs to, in any role
    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {CHARITY_COLUMNS}
            FROM charities
            WHERE id IN (SELECT charity_id FROM charity_memberships WHERE user_id = $1)
            ORDER BY name
            "#
        );
        sqlx::query_as::<_, Charity>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateCharity,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE charities SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }
        if data.website.is_some() {
            bind_count += 1;
            query.push_str(&format!(", website = ${}", bind_count));
        }
        if data.contact_email.is_some() {
            bind_count += 1;
            query.push_str(&format!(", contact_email = ${}", bind_count));
        }
        if data.tags.is_some() {
            bind_count += 1;
            query.push_str(&format!(", tags = ${}", bind_count));
        }
        if data.background_picture.is_some() {
            bind_count += 1;
            query.push_str(&format!(", background_picture = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {CHARITY_COLUMNS}"));

        let mut q = sqlx::query_as::<_, Charity>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(website) = data.website {
            q = q.bind(website);
        }
        if let Some(email) = data.contact_email {
            q = q.bind(email);
        }
        if let Some(tags) = data.tags {
            q = q.bind(tags);
        }
        if let Some(picture) = data.background_picture {
            q = q.bind(picture);
        }

        q.fetch_optional(pool).await
    }

    /// Overwrites the recorded topic keys
    pub async fn set_notify_topics(
        pool: &PgPool,
        id: Uuid,
        topic_ids: Vec<String>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE charities SET notify_topic_ids = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(topic_ids)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes the charity; memberships, applications and tasks cascade.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM charities WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
