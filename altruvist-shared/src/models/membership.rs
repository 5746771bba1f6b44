/// Charity memberships
///
/// A membership links a user to a charity with a set of roles. Roles are
/// stored as a text array so a member can hold several at once (for example
/// `["admin", "editor"]`).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE charity_memberships (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     charity_id UUID NOT NULL REFERENCES charities(id) ON DELETE CASCADE,
///     roles TEXT[] NOT NULL DEFAULT '{}',
///     permissions TEXT[] NOT NULL DEFAULT '{}',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (user_id, charity_id)
/// );
/// ```
///
/// # Roles
///
/// - **admin**: manages members, reviews applications, manages every task
/// - **creator**: founded the charity
/// - **coordinator**: reviews applications, manages tasks
/// - **editor**: creates and edits tasks
/// - **volunteer**: supporter; may post tasks on the charity's behalf

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

const MEMBERSHIP_COLUMNS: &str =
    "id, user_id, charity_id, roles, permissions, created_at, updated_at";

/// Known roles within a charity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharityRole {
    Admin,
    Creator,
    Coordinator,
    Editor,
    Volunteer,
}

impl CharityRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CharityRole::Admin => "admin",
            CharityRole::Creator => "creator",
            CharityRole::Coordinator => "coordinator",
            CharityRole::Editor => "editor",
            CharityRole::Volunteer => "volunteer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(CharityRole::Admin),
            "creator" => Some(CharityRole::Creator),
            "coordinator" => Some(CharityRole::Coordinator),
            "editor" => Some(CharityRole::Editor),
            "volunteer" => Some(CharityRole::Volunteer),
            _ => None,
        }
    }

    /// Roles whose holders see a charity's tasks on their dashboard
    pub fn managing() -> &'static [CharityRole] {
        &[
            CharityRole::Admin,
            CharityRole::Creator,
            CharityRole::Coordinator,
            CharityRole::Editor,
        ]
    }

    /// Roles allowed to post tasks for a charity
    pub fn task_posting() -> &'static [CharityRole] {
        &[CharityRole::Admin, CharityRole::Editor, CharityRole::Volunteer]
    }
}

/// Converts a role list into the text form stored in the database
pub fn role_strings(roles: &[CharityRole]) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CharityMembership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub charity_id: Uuid,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership joined with the member's display fields
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub membership: CharityMembership,
    pub name: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub user_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMembership {
    pub user_id: Uuid,
    pub charity_id: Uuid,
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl CharityMembership {
    pub fn has_role(&self, role: CharityRole) -> bool {
        self.roles.iter().any(|r| r == role.as_str())
    }

    pub fn has_any_role(&self, roles: &[CharityRole]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(CharityRole::Admin)
    }

    /// Creates the membership, merging roles into an existing one.
    ///
    /// Joining a charity twice never fails; the second call unions the role
    /// and permission sets.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        data: CreateMembership,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO charity_memberships (user_id, charity_id, roles, permissions)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, charity_id) DO UPDATE SET
                roles = ARRAY(
                    SELECT DISTINCT unnest(charity_memberships.roles || EXCLUDED.roles)
                ),
                permissions = ARRAY(
                    SELECT DISTINCT unnest(charity_memberships.permissions || EXCLUDED.permissions)
                ),
                updated_at = NOW()
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        );

        sqlx::query_as::<_, CharityMembership>(&query)
            .bind(data.user_id)
            .bind(data.charity_id)
            .bind(data.roles)
            .bind(data.permissions)
            .fetch_one(executor)
            .await
    }

    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
        charity_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM charity_memberships WHERE user_id = $1 AND charity_id = $2"
        );
        sqlx::query_as::<_, CharityMembership>(&query)
            .bind(user_id)
            .bind(charity_id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {MEMBERSHIP_COLUMNS} FROM charity_memberships WHERE id = $1");
        sqlx::query_as::<_, CharityMembership>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM charity_memberships WHERE user_id = $1 ORDER BY created_at"
        );
        sqlx::query_as::<_, CharityMembership>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Members of a charity with their names, oldest first
    pub async fn list_for_charity(
        pool: &PgPool,
        charity_id: Uuid,
    ) -> Result<Vec<MemberWithUser>, sqlx::Error> {
        sqlx::query_as::<_, MemberWithUser>(
            r#"
            SELECT m.id, m.user_id, m.charity_id, m.roles, m.permissions,
                   m.created_at, m.updated_at,
                   u.name, u.email, u.profile_picture, u.user_title
            FROM charity_memberships m
            JOIN users u ON u.id = m.user_id
            WHERE m.charity_id = $1
            ORDER BY m.created_at
            "#,
        )
        .bind(charity_id)
        .fetch_all(pool)
        .await
    }

    /// Charity ids where the user holds any of `roles`
    pub async fn charity_ids_with_roles(
        pool: &PgPool,
        user_id: Uuid,
        roles: &[CharityRole],
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT charity_id FROM charity_memberships WHERE user_id = $1 AND roles && $2",
        )
        .bind(user_id)
        .bind(role_strings(roles))
        .fetch_all(pool)
        .await
    }

    pub async fn update_roles(
        pool: &PgPool,
        id: Uuid,
        roles: Vec<String>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE charity_memberships
            SET roles = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        );
        sqlx::query_as::<_, CharityMembership>(&query)
            .bind(id)
            .bind(roles)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, user_id: Uuid, charity_id: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM charity_memberships WHERE user_id = $1 AND charity_id = $2")
                .bind(user_id)
                .bind(charity_id)
                .execute(pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_admins(pool: &PgPool, charity_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM charity_memberships WHERE charity_id = $1 AND 'admin' = ANY(roles)",
        )
        .bind(charity_id)
        .fetch_one(pool)
        .await
    }
}
