/// Database models for Altruvist
///
/// Each module owns one table (or a closely related pair) and its queries.
///
/// # Models
///
/// - `user`: accounts linked to the identity provider
/// - `charity`: charities and their notification topics
/// - `membership`: user roles within a charity
/// - `charity_application`: requests to join a charity in a reviewed role
/// - `task`: volunteer tasks, explore listing and dashboards
/// - `task_application`: volunteer applications to tasks
/// - `comment`: threaded task comments
/// - `outbox`: side effects queued for the worker
///
/// # Example
///
/// ```no_run
/// use altruvist_shared::db::pool::{create_pool, DatabaseConfig};
/// use altruvist_shared::models::user::{CreateUser, User};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let (user, created) = User::upsert_from_identity(
///     &pool,
///     CreateUser {
///         zitadel_id: "2837465".to_string(),
///         email: "ada@example.com".to_string(),
///         name: "Ada Lovelace".to_string(),
///         locale: Some("en".to_string()),
///     },
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```

pub mod charity;
pub mod charity_application;
pub mod comment;
pub mod membership;
pub mod outbox;
pub mod task;
pub mod task_application;
pub mod user;
