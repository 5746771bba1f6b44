/// Volunteer task model and database operations
///
/// A task is a piece of skilled work a charity needs done. Volunteers apply
/// to it through [`TaskApplication`](super::task_application::TaskApplication);
/// the task accepts at most `volunteers_needed` of them.
///
/// # Status
///
/// ```text
/// NOT_STARTED → IN_PROGRESS → COMPLETED
///            ↘             ↘
///              CANCELLED     CANCELLED
/// ```
///
/// Status is edited freely by task managers; the diagram shows the intended
/// progression, not an enforced state machine.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_urgency AS ENUM ('LOW', 'MEDIUM', 'HIGH');
/// CREATE TYPE task_status AS ENUM ('NOT_STARTED', 'IN_PROGRESS', 'COMPLETED', 'CANCELLED');
///
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     title TEXT NOT NULL,
///     description TEXT NOT NULL,
///     impact TEXT NOT NULL,
///     required_skills TEXT[] NOT NULL DEFAULT '{}',
///     category TEXT[] NOT NULL DEFAULT '{}',
///     urgency task_urgency,
///     volunteers_needed INTEGER NOT NULL DEFAULT 1,
///     status task_status NOT NULL DEFAULT 'NOT_STARTED',
///     deadline TIMESTAMPTZ NOT NULL,
///     location JSONB,
///     resources JSONB NOT NULL DEFAULT '[]',
///     deliverables TEXT[] NOT NULL DEFAULT '{}',
///     reward_amount BIGINT,
///     creator_wallet_address TEXT,
///     notify_topic_ids TEXT[] NOT NULL DEFAULT '{}',
///     charity_id UUID REFERENCES charities(id) ON DELETE CASCADE,
///     created_by UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// A task with no `location` is remote; one with a location is on site.
///
/// # Example
///
/// ```no_run
/// use altruvist_shared::models::task::{ExploreQuery, Task};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let mut query = ExploreQuery::default();
/// query.skills = vec!["Graphic Design".to_string()];
///
/// let page = Task::explore(&pool, &query).await?;
/// println!("{} tasks, next cursor {:?}", page.tasks.len(), page.next_cursor);
/// # Ok(())
/// # }
/// ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, PgExecutor, PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::membership::{CharityMembership, CharityRole};
use super::task_application::{ApplicationStatus, TaskApplication};
use super::user::UserRole;
use crate::integrations::notifications::topics;

const TASK_COLUMNS: &str = "t.id, t.title, t.description, t.impact, t.required_skills, \
     t.category, t.urgency, t.volunteers_needed, t.status, t.deadline, t.location, \
     t.resources, t.deliverables, t.reward_amount, t.creator_wallet_address, \
     t.notify_topic_ids, t.charity_id, t.created_by, t.created_at, t.updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_urgency", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskUrgency {
    Low,
    Medium,
    High,
}

impl TaskUrgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskUrgency::Low => "LOW",
            TaskUrgency::Medium => "MEDIUM",
            TaskUrgency::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(TaskUrgency::Low),
            "MEDIUM" => Some(TaskUrgency::Medium),
            "HIGH" => Some(TaskUrgency::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::NotStarted,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "NOT_STARTED",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

/// Sort direction accepted by listing endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Lenient parse; anything other than "asc" or "desc" means unset
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

/// Remote tasks have no location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationType {
    Remote,
    Onsite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TaskLocation {
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,

    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be between -90 and 90"))]
    pub lat: f64,

    #[validate(range(
        min = -180.0,
        max = 180.0,
        message = "Longitude must be between -180 and 180"
    ))]
    pub lng: f64,
}

/// An uploaded file attached to a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TaskResource {
    pub name: Option<String>,
    pub extension: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub size: Option<i64>,

    #[validate(url(message = "Upload URL must be a valid URL"))]
    #[serde(rename = "uploadURL")]
    pub upload_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,

    /// One-line statement of the difference the work makes
    pub impact: String,

    pub required_skills: Vec<String>,
    pub category: Vec<String>,
    pub urgency: Option<TaskUrgency>,
    pub volunteers_needed: i32,
    pub status: TaskStatus,
    pub deadline: DateTime<Utc>,
    pub location: Option<Json<TaskLocation>>,
    pub resources: Json<Vec<TaskResource>>,
    pub deliverables: Vec<String>,

    /// Token reward; stored only, paid out on chain by the client
    pub reward_amount: Option<i64>,
    pub creator_wallet_address: Option<String>,

    /// `tasks:charities:{id}` and `tasks:volunteers:{id}`
    pub notify_topic_ids: Vec<String>,

    pub charity_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn validate_future(deadline: &DateTime<Utc>) -> Result<(), ValidationError> {
    if *deadline <= Utc::now() {
        let mut err = ValidationError::new("deadline");
        err.message = Some("Deadline must be in the future".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTask {
    #[validate(length(min = 1, max = 50, message = "Title must be between 1 and 50 characters"))]
    pub title: String,

    #[validate(length(
        min = 1,
        max = 500,
        message = "Description must be between 1 and 500 characters"
    ))]
    pub description: String,

    #[validate(length(min = 1, max = 80, message = "Impact must be between 1 and 80 characters"))]
    pub impact: String,

    pub charity_id: Uuid,

    #[validate(length(min = 1, max = 4, message = "Provide between 1 and 4 skills"))]
    pub required_skills: Vec<String>,

    #[validate(length(min = 1, max = 2, message = "Provide 1 or 2 categories"))]
    pub category: Vec<String>,

    pub urgency: Option<TaskUrgency>,

    #[validate(range(min = 1, max = 50, message = "Volunteers needed must be between 1 and 50"))]
    pub volunteers_needed: i32,

    #[validate(length(min = 1, max = 5, message = "Provide between 1 and 5 deliverables"))]
    pub deliverables: Vec<String>,

    #[validate(custom(function = "validate_future"))]
    pub deadline: DateTime<Utc>,

    #[validate(nested)]
    pub location: Option<TaskLocation>,

    #[serde(default)]
    #[validate(nested)]
    pub resources: Vec<TaskResource>,

    pub reward_amount: Option<i64>,
    pub creator_wallet_address: Option<String>,
}

/// Task edit. Fields left `None` are kept, except `location`: an edit always
/// states where the task happens, so a missing location makes it remote.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateTask {
    #[validate(length(min = 1, max = 50, message = "Title must be between 1 and 50 characters"))]
    pub title: Option<String>,

    #[validate(length(
        min = 1,
        max = 500,
        message = "Description must be between 1 and 500 characters"
    ))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 80, message = "Impact must be between 1 and 80 characters"))]
    pub impact: Option<String>,

    #[validate(length(min = 1, max = 4, message = "Provide between 1 and 4 skills"))]
    pub required_skills: Option<Vec<String>>,

    #[validate(length(min = 1, max = 2, message = "Provide 1 or 2 categories"))]
    pub category: Option<Vec<String>>,

    pub urgency: Option<TaskUrgency>,

    #[validate(range(min = 1, max = 50, message = "Volunteers needed must be between 1 and 50"))]
    pub volunteers_needed: Option<i32>,

    pub status: Option<TaskStatus>,

    #[validate(length(min = 1, max = 5, message = "Provide between 1 and 5 deliverables"))]
    pub deliverables: Option<Vec<String>>,

    #[validate(custom(function = "validate_future"))]
    pub deadline: Option<DateTime<Utc>>,

    #[validate(nested)]
    pub location: Option<TaskLocation>,

    #[validate(nested)]
    pub resources: Option<Vec<TaskResource>>,
}

/// Charity summary embedded in task listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharityRef {
    pub id: Uuid,
    pub name: String,
}

/// A task with its charity, creator name and applications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWithApplications {
    #[serde(flatten)]
    pub task: Task,
    pub charity: Option<CharityRef>,
    pub creator_name: Option<String>,
    pub task_applications: Vec<TaskApplication>,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    #[sqlx(flatten)]
    task: Task,
    charity_name: Option<String>,
    creator_name: Option<String>,
}

impl TaskRow {
    fn into_listing(self, task_applications: Vec<TaskApplication>) -> TaskWithApplications {
        let charity = match (self.task.charity_id, self.charity_name) {
            (Some(id), Some(name)) => Some(CharityRef { id, name }),
            _ => None,
        };
        TaskWithApplications {
            task: self.task,
            charity,
            creator_name: self.creator_name,
            task_applications,
        }
    }
}

/// Filters and ordering for the public explore listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExploreQuery {
    /// Id of the last task of the previous page
    pub cursor: Option<Uuid>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub urgency: Option<TaskUrgency>,
    pub status: Option<TaskStatus>,
    pub location_type: Option<LocationType>,
    pub deadline: Option<SortDirection>,
    pub created_at: Option<SortDirection>,
    pub updated_at: Option<SortDirection>,
}

impl ExploreQuery {
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;

    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    /// Sort keys in priority order. `created_at` always participates and
    /// defaults to descending; `id` breaks ties.
    fn order_keys(&self) -> Vec<(&'static str, SortDirection)> {
        let mut keys = Vec::with_capacity(4);
        if let Some(dir) = self.deadline {
            keys.push(("deadline", dir));
        }
        keys.push(("created_at", self.created_at.unwrap_or(SortDirection::Desc)));
        if let Some(dir) = self.updated_at {
            keys.push(("updated_at", dir));
        }
        keys.push(("id", SortDirection::Asc));
        keys
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplorePage {
    pub tasks: Vec<TaskWithApplications>,
    pub next_cursor: Option<Uuid>,
}

/// Dashboard listing options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserTasksQuery {
    /// Task status for charity users, application status for volunteers
    pub status: Option<String>,
    pub charity_id: Option<Uuid>,
    pub deadline: Option<SortDirection>,
    pub created_at: Option<SortDirection>,
    pub updated_at: Option<SortDirection>,
    pub take: Option<i64>,
}

impl UserTasksQuery {
    fn order_clause(&self, prefix: &str, tiebreak: &str) -> String {
        let mut parts = Vec::new();
        if let Some(dir) = self.deadline {
            parts.push(format!("{prefix}.deadline {}", dir.as_sql()));
        }
        if let Some(dir) = self.updated_at {
            parts.push(format!("{prefix}.updated_at {}", dir.as_sql()));
        }
        if let Some(dir) = self.created_at {
            parts.push(format!("{prefix}.created_at {}", dir.as_sql()));
        }
        parts.push(format!("{tiebreak} DESC"));
        parts.join(", ")
    }
}

#[derive(Debug, Error)]
pub enum TaskQueryError {
    #[error("Invalid status filter: {0}")]
    InvalidStatus(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Task {
    /// Whether the task has a physical location
    pub fn is_onsite(&self) -> bool {
        self.location.is_some()
    }

    pub fn charities_topic(&self) -> Option<&str> {
        self.notify_topic_ids
            .iter()
            .find(|id| id.contains("charities"))
            .map(String::as_str)
    }

    pub fn volunteers_topic(&self) -> Option<&str> {
        self.notify_topic_ids
            .iter()
            .find(|id| id.contains("volunteers"))
            .map(String::as_str)
    }

    /// Inserts a task in NOT_STARTED with its topic keys assigned
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        data: CreateTask,
        created_by: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        let topic_ids = vec![topics::task_charities(id), topics::task_volunteers(id)];

        let query = format!(
            r#"
            INSERT INTO tasks AS t
                (id, title, description, impact, required_skills, category, urgency,
                 volunteers_needed, status, deadline, location, resources, deliverables,
                 reward_amount, creator_wallet_address, notify_topic_ids, charity_id, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'NOT_STARTED', $9, $10, $11, $12,
                    $13, $14, $15, $16, $17)
            RETURNING {TASK_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(data.title)
            .bind(data.description)
            .bind(data.impact)
            .bind(data.required_skills)
            .bind(data.category)
            .bind(data.urgency)
            .bind(data.volunteers_needed)
            .bind(data.deadline)
            .bind(data.location.map(Json))
            .bind(Json(data.resources))
            .bind(data.deliverables)
            .bind(data.reward_amount)
            .bind(data.creator_wallet_address)
            .bind(topic_ids)
            .bind(data.charity_id)
            .bind(created_by)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Loads a task together with its charity and every application
    pub async fn find_with_applications(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<TaskWithApplications>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {TASK_COLUMNS}, c.name AS charity_name, u.name AS creator_name
            FROM tasks t
            LEFT JOIN charities c ON c.id = t.charity_id
            LEFT JOIN users u ON u.id = t.created_by
            WHERE t.id = $1
            "#
        );
        let Some(row) = sqlx::query_as::<_, TaskRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
        else {
            return Ok(None);
        };

        let applications = TaskApplication::list_for_task(pool, id).await?;
        Ok(Some(row.into_listing(applications)))
    }

    /// Applies an edit and bumps `updated_at`
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE tasks AS t SET updated_at = NOW(), location = ");
        qb.push_bind(data.location.map(Json));

        if let Some(title) = data.title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(description) = data.description {
            qb.push(", description = ").push_bind(description);
        }
        if let Some(impact) = data.impact {
            qb.push(", impact = ").push_bind(impact);
        }
        if let Some(skills) = data.required_skills {
            qb.push(", required_skills = ").push_bind(skills);
        }
        if let Some(category) = data.category {
            qb.push(", category = ").push_bind(category);
        }
        if let Some(urgency) = data.urgency {
            qb.push(", urgency = ").push_bind(urgency);
        }
        if let Some(needed) = data.volunteers_needed {
            qb.push(", volunteers_needed = ").push_bind(needed);
        }
        if let Some(status) = data.status {
            qb.push(", status = ").push_bind(status);
        }
        if let Some(deliverables) = data.deliverables {
            qb.push(", deliverables = ").push_bind(deliverables);
        }
        if let Some(deadline) = data.deadline {
            qb.push(", deadline = ").push_bind(deadline);
        }
        if let Some(resources) = data.resources {
            qb.push(", resources = ").push_bind(Json(resources));
        }

        qb.push(" WHERE t.id = ").push_bind(id);
        qb.push(" RETURNING ").push(TASK_COLUMNS);

        qb.build_query_as::<Task>().fetch_optional(pool).await
    }

    /// Deletes the task; applications and comments cascade
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All tasks of a charity, newest first
    pub async fn list_for_charity(
        pool: &PgPool,
        charity_id: Uuid,
    ) -> Result<Vec<TaskWithApplications>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {TASK_COLUMNS}, c.name AS charity_name, u.name AS creator_name
            FROM tasks t
            LEFT JOIN charities c ON c.id = t.charity_id
            LEFT JOIN users u ON u.id = t.created_by
            WHERE t.charity_id = $1
            ORDER BY t.created_at DESC
            "#
        );
        let rows = sqlx::query_as::<_, TaskRow>(&query)
            .bind(charity_id)
            .fetch_all(pool)
            .await?;

        hydrate(pool, rows).await
    }

    /// Public, cursor-paginated task listing
    pub async fn explore(pool: &PgPool, query: &ExploreQuery) -> Result<ExplorePage, sqlx::Error> {
        let limit = query.effective_limit();
        let keys = query.order_keys();

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"
            SELECT {TASK_COLUMNS}, c.name AS charity_name, u.name AS creator_name
            FROM tasks t
            LEFT JOIN charities c ON c.id = t.charity_id
            LEFT JOIN users u ON u.id = t.created_by
            WHERE TRUE
            "#
        ));

        if !query.category.is_empty() {
            qb.push(" AND t.category && ").push_bind(query.category.clone());
        }
        if !query.skills.is_empty() {
            qb.push(" AND t.required_skills && ").push_bind(query.skills.clone());
        }
        if let Some(urgency) = query.urgency {
            qb.push(" AND t.urgency = ").push_bind(urgency);
        }
        if let Some(status) = query.status {
            qb.push(" AND t.status = ").push_bind(status);
        }
        match query.location_type {
            Some(LocationType::Remote) => {
                qb.push(" AND t.location IS NULL");
            }
            Some(LocationType::Onsite) => {
                qb.push(" AND t.location IS NOT NULL");
            }
            None => {}
        }

        // Keyset predicate: rows strictly after the cursor row under `keys`.
        if let Some(cursor) = query.cursor {
            qb.push(" AND (");
            for (i, (column, dir)) in keys.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("(");
                for (prev, _) in &keys[..i] {
                    qb.push(format!("t.{prev} = (SELECT {prev} FROM tasks WHERE id = "));
                    qb.push_bind(cursor);
                    qb.push(") AND ");
                }
                let op = match dir {
                    SortDirection::Asc => ">",
                    SortDirection::Desc => "<",
                };
                qb.push(format!("t.{column} {op} (SELECT {column} FROM tasks WHERE id = "));
                qb.push_bind(cursor);
                qb.push("))");
            }
            qb.push(")");
        }

        qb.push(" ORDER BY ");
        let order = keys
            .iter()
            .map(|(column, dir)| format!("t.{column} {}", dir.as_sql()))
            .collect::<Vec<_>>()
            .join(", ");
        qb.push(order);
        qb.push(" LIMIT ").push_bind(limit);

        let rows = qb.build_query_as::<TaskRow>().fetch_all(pool).await?;

        let next_cursor = if rows.len() as i64 == limit {
            rows.last().map(|row| row.task.id)
        } else {
            None
        };

        Ok(ExplorePage {
            tasks: hydrate(pool, rows).await?,
            next_cursor,
        })
    }

    /// Tasks shown on a user's dashboard.
    ///
    /// Charity users see tasks they created plus tasks of charities where they
    /// hold a managing role. Volunteers see the tasks they applied to, each
    /// carrying only their own application.
    pub async fn list_for_user(
        pool: &PgPool,
        role: UserRole,
        user_id: Uuid,
        query: &UserTasksQuery,
    ) -> Result<Vec<TaskWithApplications>, TaskQueryError> {
        match role {
            UserRole::Charity => Self::list_for_charity_member(pool, user_id, query).await,
            UserRole::Volunteer => Self::list_for_volunteer(pool, user_id, query).await,
        }
    }

    async fn list_for_charity_member(
        pool: &PgPool,
        user_id: Uuid,
        query: &UserTasksQuery,
    ) -> Result<Vec<TaskWithApplications>, TaskQueryError> {
        let status = match query.status.as_deref() {
            Some(s) => Some(
                TaskStatus::parse(s).ok_or_else(|| TaskQueryError::InvalidStatus(s.to_string()))?,
            ),
            None => None,
        };

        let charity_ids =
            CharityMembership::charity_ids_with_roles(pool, user_id, CharityRole::managing())
                .await?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"
            SELECT {TASK_COLUMNS}, c.name AS charity_name, u.name AS creator_name
            FROM tasks t
            LEFT JOIN charities c ON c.id = t.charity_id
            LEFT JOIN users u ON u.id = t.created_by
            WHERE (t.created_by =
            "#
        ));
        qb.push_bind(user_id);
        qb.push(" OR t.charity_id = ANY(").push_bind(charity_ids).push("))");

        if let Some(status) = status {
            qb.push(" AND t.status = ").push_bind(status);
        }
        if let Some(charity_id) = query.charity_id {
            qb.push(" AND t.charity_id = ").push_bind(charity_id);
        }

        qb.push(" ORDER BY ").push(query.order_clause("t", "t.created_at"));
        if let Some(take) = query.take {
            qb.push(" LIMIT ").push_bind(take.max(0));
        }

        let rows = qb.build_query_as::<TaskRow>().fetch_all(pool).await?;
        Ok(hydrate(pool, rows).await?)
    }

    async fn list_for_volunteer(
        pool: &PgPool,
        user_id: Uuid,
        query: &UserTasksQuery,
    ) -> Result<Vec<TaskWithApplications>, TaskQueryError> {
        let status = match query.status.as_deref() {
            Some(s) => Some(
                ApplicationStatus::parse(s)
                    .ok_or_else(|| TaskQueryError::InvalidStatus(s.to_string()))?,
            ),
            None => None,
        };

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"
            SELECT {TASK_COLUMNS}, c.name AS charity_name, u.name AS creator_name,
                   a.id AS application_id
            FROM task_applications a
            JOIN tasks t ON t.id = a.task_id
            LEFT JOIN charities c ON c.id = t.charity_id
            LEFT JOIN users u ON u.id = t.created_by
            WHERE a.user_id =
            "#
        ));
        qb.push_bind(user_id);

        if let Some(status) = status {
            qb.push(" AND a.status = ").push_bind(status);
        }
        if let Some(charity_id) = query.charity_id {
            qb.push(" AND t.charity_id = ").push_bind(charity_id);
        }

        qb.push(" ORDER BY ").push(query.order_clause("t", "a.created_at"));
        if let Some(take) = query.take {
            qb.push(" LIMIT ").push_bind(take.max(0));
        }

        let rows = qb
            .build_query_as::<VolunteerTaskRow>()
            .fetch_all(pool)
            .await?;

        let application_ids: Vec<Uuid> = rows.iter().map(|r| r.application_id).collect();
        let mut applications: HashMap<Uuid, TaskApplication> =
            TaskApplication::find_many(pool, &application_ids)
                .await?
                .into_iter()
                .map(|a| (a.id, a))
                .collect();

        Ok(rows
            .into_iter()
            .map(|row| {
                let own = applications
                    .remove(&row.application_id)
                    .into_iter()
                    .collect();
                row.task_row.into_listing(own)
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct VolunteerTaskRow {
    #[sqlx(flatten)]
    task_row: TaskRow,
    application_id: Uuid,
}

/// Attaches every application to its task, preserving row order
async fn hydrate(
    pool: &PgPool,
    rows: Vec<TaskRow>,
) -> Result<Vec<TaskWithApplications>, sqlx::Error> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.task.id).collect();
    let mut by_task: HashMap<Uuid, Vec<TaskApplication>> = HashMap::new();
    for application in TaskApplication::list_for_tasks(pool, &ids).await? {
        by_task
            .entry(application.task_id)
            .or_default()
            .push(application);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let applications = by_task.remove(&row.task.id).unwrap_or_default();
            row.into_listing(applications)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_input() -> CreateTask {
        CreateTask {
            title: "Design a donation flyer".to_string(),
            description: "A4 flyer for the spring food drive".to_string(),
            impact: "More donations for the food bank".to_string(),
            charity_id: Uuid::new_v4(),
            required_skills: vec!["Graphic Design".to_string()],
            category: vec!["Food Banks".to_string()],
            urgency: Some(TaskUrgency::High),
            volunteers_needed: 2,
            deliverables: vec!["Print-ready PDF".to_string()],
            deadline: Utc::now() + Duration::days(14),
            location: None,
            resources: Vec::new(),
            reward_amount: None,
            creator_wallet_address: None,
        }
    }

    #[test]
    fn test_create_task_valid() {
        assert!(create_input().validate().is_ok());
    }

    #[test]
    fn test_create_task_limits() {
        let mut task = create_input();
        task.title = "x".repeat(51);
        assert!(task.validate().is_err());

        let mut task = create_input();
        task.required_skills = vec!["a", "b", "c", "d", "e"]
            .into_iter()
            .map(String::from)
            .collect();
        assert!(task.validate().is_err());

        let mut task = create_input();
        task.category = Vec::new();
        assert!(task.validate().is_err());

        let mut task = create_input();
        task.volunteers_needed = 51;
        assert!(task.validate().is_err());

        let mut task = create_input();
        task.deliverables = vec!["d".to_string(); 6];
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_deadline_must_be_future() {
        let mut task = create_input();
        task.deadline = Utc::now() - Duration::hours(1);
        let errors = task.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("deadline"));
    }

    #[test]
    fn test_location_bounds() {
        let mut task = create_input();
        task.location = Some(TaskLocation {
            address: "1 High Street".to_string(),
            lat: 91.0,
            lng: 0.0,
        });
        assert!(task.validate().is_err());

        task.location = Some(TaskLocation {
            address: "1 High Street".to_string(),
            lat: 51.5,
            lng: -0.12,
        });
        assert!(task.validate().is_ok());

        task.location = Some(TaskLocation {
            address: String::new(),
            lat: 51.5,
            lng: -0.12,
        });
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_resource_url_validated() {
        let mut task = create_input();
        task.resources = vec![TaskResource {
            name: Some("brief".to_string()),
            extension: Some("pdf".to_string()),
            kind: Some("application/pdf".to_string()),
            size: Some(1024),
            upload_url: Some("not a url".to_string()),
        }];
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_status_parse() {
        for status in TaskStatus::ALL {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("OPEN"), None);
        assert_eq!(TaskUrgency::parse("MEDIUM"), Some(TaskUrgency::Medium));
    }

    #[test]
    fn test_explore_order_keys() {
        let query = ExploreQuery::default();
        assert_eq!(
            query.order_keys(),
            vec![("created_at", SortDirection::Desc), ("id", SortDirection::Asc)]
        );

        let query = ExploreQuery {
            deadline: Some(SortDirection::Asc),
            updated_at: Some(SortDirection::Desc),
            created_at: Some(SortDirection::Asc),
            ..Default::default()
        };
        assert_eq!(
            query.order_keys(),
            vec![
                ("deadline", SortDirection::Asc),
                ("created_at", SortDirection::Asc),
                ("updated_at", SortDirection::Desc),
                ("id", SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn test_explore_limit_clamped() {
        let mut query = ExploreQuery::default();
        assert_eq!(query.effective_limit(), 10);
        query.limit = Some(0);
        assert_eq!(query.effective_limit(), 1);
        query.limit = Some(10_000);
        assert_eq!(query.effective_limit(), 100);
    }

    #[test]
    fn test_user_tasks_order_clause() {
        let query = UserTasksQuery {
            deadline: Some(SortDirection::Asc),
            ..Default::default()
        };
        assert_eq!(
            query.order_clause("t", "t.created_at"),
            "t.deadline ASC, t.created_at DESC"
        );
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!(SortDirection::parse("asc"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::parse("desc"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse("sideways"), None);
    }
}
