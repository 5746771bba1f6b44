/// User model and database operations
///
/// Users are provisioned the first time they sign in through Zitadel and are
/// keyed by the identity provider's subject (`zitadel_id`). A freshly
/// provisioned user has no roles; onboarding assigns exactly one of
/// `charity` or `volunteer`.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     zitadel_id TEXT NOT NULL UNIQUE,
///     email TEXT NOT NULL,
///     name TEXT NOT NULL,
///     locale TEXT,
///     roles TEXT[] NOT NULL DEFAULT '{}',
///     user_title TEXT,
///     bio TEXT,
///     skills TEXT[] NOT NULL DEFAULT '{}',
///     preferred_charities TEXT[] NOT NULL DEFAULT '{}',
///     profile_picture TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use altruvist_shared::models::user::{CreateUser, User};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let (user, created) = User::upsert_from_identity(&pool, CreateUser {
///     zitadel_id: "2841923".to_string(),
///     email: "ada@example.org".to_string(),
///     name: "Ada Lovelace".to_string(),
///     locale: Some("en".to_string()),
/// }).await?;
///
/// if created && user.roles.is_empty() {
///     println!("{} still needs onboarding", user.name);
/// }
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::integrations::notifications;

const USER_COLUMNS: &str = "id, zitadel_id, email, name, locale, roles, user_title, bio, \
     skills, preferred_charities, profile_picture, created_at, updated_at";

/// Platform-level role chosen during onboarding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Represents one or more charities and posts tasks
    Charity,

    /// Applies to tasks
    Volunteer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Charity => "charity",
            UserRole::Volunteer => "volunteer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "charity" => Some(UserRole::Charity),
            "volunteer" => Some(UserRole::Volunteer),
            _ => None,
        }
    }
}

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Subject claim from the identity provider
    pub zitadel_id: String,

    pub email: String,
    pub name: String,
    pub locale: Option<String>,

    /// Platform roles; empty until onboarding completes
    pub roles: Vec<String>,

    /// Short headline shown under the name
    pub user_title: Option<String>,
    pub bio: Option<String>,
    pub skills: Vec<String>,

    /// Charity categories a volunteer cares about
    pub preferred_charities: Vec<String>,

    /// Object storage URL or key of the avatar
    pub profile_picture: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity fields copied from the OIDC userinfo response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub zitadel_id: String,
    pub email: String,
    pub name: String,
    pub locale: Option<String>,
}

/// Profile data captured by the onboarding form
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Onboarding {
    pub role: UserRole,

    #[validate(length(max = 50, message = "Title must be at most 50 characters"))]
    pub user_title: String,

    pub profile_picture: Option<String>,

    #[validate(length(max = 1000, message = "Bio must be at most 1000 characters"))]
    pub bio: Option<String>,

    #[serde(default)]
    pub skills: Vec<String>,

    #[serde(default)]
    pub preferred_charities: Vec<String>,
}

/// Partial profile update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(min = 1, max = 80, message = "Name must be between 1 and 80 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 50, message = "Title must be at most 50 characters"))]
    pub user_title: Option<String>,

    #[validate(length(max = 1000, message = "Bio must be at most 1000 characters"))]
    pub bio: Option<String>,

    pub skills: Option<Vec<String>>,
    pub preferred_charities: Option<Vec<String>>,
    pub profile_picture: Option<String>,
}

impl UpdateUser {
    /// Volunteers must keep at least one skill and one preferred charity.
    ///
    /// Only fields present in the update are checked.
    pub fn validate_for(&self, user: &User) -> Result<(), ValidationError> {
        if !user.is_volunteer() {
            return Ok(());
        }

        if matches!(&self.skills, Some(skills) if skills.is_empty()) {
            let mut err = ValidationError::new("skills");
            err.message = Some("Please select at least one skill".into());
            return Err(err);
        }
        if matches!(&self.preferred_charities, Some(c) if c.is_empty()) {
            let mut err = ValidationError::new("preferred_charities");
            err.message = Some("Please select at least one preferred charity".into());
            return Err(err);
        }

        Ok(())
    }
}

impl User {
    pub fn has_role(&self, role: UserRole) -> bool {
        self.roles.iter().any(|r| r == role.as_str())
    }

    pub fn is_charity(&self) -> bool {
        self.has_role(UserRole::Charity)
    }

    pub fn is_volunteer(&self) -> bool {
        self.has_role(UserRole::Volunteer)
    }

    /// First name and remainder, as expected by the notification service
    pub fn split_name(&self) -> (String, String) {
        notifications::split_name(&self.name)
    }

    /// Inserts the user unless one with the same `zitadel_id` exists.
    ///
    /// Returns the stored user and whether it was newly created.
    pub async fn upsert_from_identity(
        pool: &PgPool,
        data: CreateUser,
    ) -> Result<(Self, bool), sqlx::Error> {
        if let Some(existing) = Self::find_by_zitadel_id(pool, &data.zitadel_id).await? {
            return Ok((existing, false));
        }

        let query = format!(
            r#"
            INSERT INTO users (zitadel_id, email, name, locale)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (zitadel_id) DO UPDATE SET updated_at = users.updated_at
            RETURNING {USER_COLUMNS}, (xmax = 0) AS inserted
            "#
        );

        let row: UserWithInsertFlag = sqlx::query_as(&query)
            .bind(data.zitadel_id)
            .bind(data.email)
            .bind(data.name)
            .bind(data.locale)
            .fetch_one(pool)
            .await?;

        Ok((row.user, row.inserted))
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_zitadel_id(
        pool: &PgPool,
        zitadel_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE zitadel_id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(zitadel_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Assigns the onboarding role and profile.
    ///
    /// Volunteer-only fields (bio, skills, preferred charities) are ignored for
    /// charity users; their bio lives on the charity instead.
    pub async fn complete_onboarding<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        data: &Onboarding,
    ) -> Result<Option<Self>, sqlx::Error> {
        let (bio, skills, preferred) = match data.role {
            UserRole::Volunteer => (
                data.bio.clone(),
                data.skills.clone(),
                data.preferred_charities.clone(),
            ),
            UserRole::Charity => (None, Vec::new(), Vec::new()),
        };

        let query = format!(
            r#"
            UPDATE users
            SET roles = ARRAY[$2]::TEXT[],
                user_title = $3,
                profile_picture = $4,
                bio = COALESCE($5, bio),
                skills = $6,
                preferred_charities = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(data.role.as_str())
            .bind(&data.user_title)
            .bind(&data.profile_picture)
            .bind(bio)
            .bind(skills)
            .bind(preferred)
            .fetch_optional(executor)
            .await
    }

    /// Updates only the fields present in `data`
    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE users SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", name = ${}", bind_count));
        }
        if data.user_title.is_some() {
            bind_count += 1;
            query.push_str(&format!(", user_title = ${}", bind_count));
        }
        if data.bio.is_some() {
            bind_count += 1;
            query.push_str(&format!(", bio = ${}", bind_count));
        }
        if data.skills.is_some() {
            bind_count += 1;
            query.push_str(&format!(", skills = ${}", bind_count));
        }
        if data.preferred_charities.is_some() {
            bind_count += 1;
            query.push_str(&format!(", preferred_charities = ${}", bind_count));
        }
        if data.profile_picture.is_some() {
            bind_count += 1;
            query.push_str(&format!(", profile_picture = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {USER_COLUMNS}"));

        let mut q = sqlx::query_as::<_, User>(&query).bind(id);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(title) = data.user_title {
            q = q.bind(title);
        }
        if let Some(bio) = data.bio {
            q = q.bind(bio);
        }
        if let Some(skills) = data.skills {
            q = q.bind(skills);
        }
        if let Some(preferred) = data.preferred_charities {
            q = q.bind(preferred);
        }
        if let Some(picture) = data.profile_picture {
            q = q.bind(picture);
        }

        q.fetch_optional(pool).await
    }

    /// Deletes the user; memberships, applications and comments cascade.
    pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct UserWithInsertFlag {
    #[sqlx(flatten)]
    user: User,
    inserted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_roles(roles: &[&str]) -> User {
        User {
            id: Uuid::new_v4(),
            zitadel_id: "sub".to_string(),
            email: "ada@example.org".to_string(),
            name: "Ada King Lovelace".to_string(),
            locale: None,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            user_title: None,
            bio: None,
            skills: vec!["Writing".to_string()],
            preferred_charities: vec!["Education".to_string()],
            profile_picture: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_role_round_trip() {
        assert_eq!(UserRole::parse("charity"), Some(UserRole::Charity));
        assert_eq!(UserRole::parse("volunteer"), Some(UserRole::Volunteer));
        assert_eq!(UserRole::parse("admin"), None);
        assert_eq!(UserRole::Volunteer.as_str(), "volunteer");
    }

    #[test]
    fn test_has_role() {
        let user = user_with_roles(&["charity"]);
        assert!(user.is_charity());
        assert!(!user.is_volunteer());
    }

    #[test]
    fn test_split_name() {
        let user = user_with_roles(&[]);
        assert_eq!(
            user.split_name(),
            ("Ada".to_string(), "King Lovelace".to_string())
        );
    }

    #[test]
    fn test_update_user_length_rules() {
        let update = UpdateUser {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(update.validate().is_err());

        let update = UpdateUser {
            user_title: Some("x".repeat(51)),
            ..Default::default()
        };
        assert!(update.validate().is_err());

        let update = UpdateUser {
            name: Some("Ada".to_string()),
            bio: Some("x".repeat(1000)),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_volunteer_must_keep_skills() {
        let volunteer = user_with_roles(&["volunteer"]);
        let update = UpdateUser {
            skills: Some(Vec::new()),
            ..Default::default()
        };
        assert!(update.validate_for(&volunteer).is_err());

        let charity = user_with_roles(&["charity"]);
        assert!(update.validate_for(&charity).is_ok());
    }
}
