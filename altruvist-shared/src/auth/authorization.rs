/// Charity-scoped permission checks
///
/// Permissions come from the caller's roles in a charity membership. Task
/// permissions derive from the task's charity, plus the task creator.
///
/// # Example
///
/// ```no_run
/// use altruvist_shared::auth::authorization::require_charity_admin;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid, charity_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let membership = require_charity_admin(&pool, user_id, charity_id).await?;
/// assert!(membership.is_admin());
/// # Ok(())
/// # }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::membership::{CharityMembership, CharityRole};
use crate::models::task::Task;

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("Not a member of this charity")]
    NotMember,

    #[error("Requires one of the roles: {0}")]
    MissingRole(String),

    #[error("Not authorized to manage this task")]
    NotTaskManager,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Roles that can manage a task alongside its creator
pub const TASK_MANAGER_ROLES: &[CharityRole] =
    &[CharityRole::Admin, CharityRole::Coordinator, CharityRole::Editor];

fn describe(roles: &[CharityRole]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Returns the caller's membership if it holds any of `roles`
pub async fn require_charity_role(
    pool: &PgPool,
    user_id: Uuid,
    charity_id: Uuid,
    roles: &[CharityRole],
) -> Result<CharityMembership, AuthzError> {
    let membership = CharityMembership::find(pool, user_id, charity_id)
        .await?
        .ok_or(AuthzError::NotMember)?;

    if !membership.has_any_role(roles) {
        tracing::debug!(
            user_id = %user_id,
            charity_id = %charity_id,
            "Charity role check failed"
        );
        return Err(AuthzError::MissingRole(describe(roles)));
    }

    Ok(membership)
}

pub async fn require_charity_admin(
    pool: &PgPool,
    user_id: Uuid,
    charity_id: Uuid,
) -> Result<CharityMembership, AuthzError> {
    require_charity_role(pool, user_id, charity_id, &[CharityRole::Admin]).await
}

/// Whether `user_id` may edit, delete or review applications for `task`
pub async fn is_task_manager(pool: &PgPool, user_id: Uuid, task: &Task) -> Result<bool, AuthzError> {
    if task.created_by == user_id {
        return Ok(true);
    }
    let Some(charity_id) = task.charity_id else {
        return Ok(false);
    };

    Ok(CharityMembership::find(pool, user_id, charity_id)
        .await?
        .is_some_and(|m| m.has_any_role(TASK_MANAGER_ROLES)))
}

pub async fn require_task_manager(
    pool: &PgPool,
    user_id: Uuid,
    task: &Task,
) -> Result<(), AuthzError> {
    if !is_task_manager(pool, user_id, task).await? {
        return Err(AuthzError::NotTaskManager);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_manager_roles() {
        assert_eq!(describe(TASK_MANAGER_ROLES), "admin, coordinator, editor");
        assert!(!TASK_MANAGER_ROLES.contains(&CharityRole::Volunteer));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AuthzError::MissingRole(describe(&[CharityRole::Admin])).to_string(),
            "Requires one of the roles: admin"
        );
    }
}
