/// # Meilisearch
///
/// Full-text search over tasks, users and charities.
///
/// Writes reach the index through the outbox: handlers enqueue
/// `IndexDocument`/`DeleteDocument` jobs and the worker calls
/// [`SearchClient::index_document`] and [`SearchClient::delete_document`].
/// Queries are proxied synchronously by the API through
/// [`SearchClient::search_all`].
///
/// ## Indices
/// - `skillanthropy_tasks`
/// - `skillanthropy_users`
/// - `skillanthropy_charities`
/// - `skillanthropy_taskApplications`
///
/// Documents are flattened before indexing: nested objects and arrays of
/// objects become JSON strings so Meilisearch treats them as searchable text.

use meilisearch_sdk::errors::{Error as MeiliError, ErrorType};
use meilisearch_sdk::{client::Client, settings::Settings};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub const TASKS_INDEX: &str = "skillanthropy_tasks";
pub const USERS_INDEX: &str = "skillanthropy_users";
pub const CHARITIES_INDEX: &str = "skillanthropy_charities";
pub const TASK_APPLICATIONS_INDEX: &str = "skillanthropy_taskApplications";

pub const PRIMARY_KEY: &str = "id";

const MIN_QUERY_LEN: usize = 2;
const MAX_QUERY_LEN: usize = 100;
const SEARCH_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search query must be between {MIN_QUERY_LEN} and {MAX_QUERY_LEN} characters")]
    InvalidQuery,

    #[error("Search service is currently unavailable")]
    Unavailable,

    #[error("Document must be a JSON object with an id")]
    InvalidDocument,

    #[error("Meilisearch error: {0}")]
    Meilisearch(#[from] meilisearch_sdk::errors::Error),
}

impl SearchError {
    /// Whether the same request could succeed later.
    ///
    /// Invalid requests and auth failures are rejected the same way every
    /// time; a raw HTTP answer counts only when it is 429 or 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::InvalidQuery | SearchError::InvalidDocument => false,
            SearchError::Unavailable => true,
            SearchError::Meilisearch(MeiliError::Meilisearch(e)) => {
                !matches!(e.error_type, ErrorType::InvalidRequest | ErrorType::Auth)
            }
            SearchError::Meilisearch(MeiliError::MeilisearchCommunication(e)) => {
                e.status_code == 429 || e.status_code >= 500
            }
            SearchError::Meilisearch(_) => true,
        }
    }
}

/// One hit, tagged with the index it came from
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub collection: &'static str,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub tasks: Vec<Value>,
    pub users: Vec<Value>,
    pub charities: Vec<Value>,

    /// Every hit in task, user, charity order
    pub documents: Vec<SearchHit>,
}

pub struct SearchClient {
    client: Client,
}

impl SearchClient {
    pub fn new(host: &str, api_key: Option<&str>) -> Result<Self, SearchError> {
        Ok(Self {
            client: Client::new(host, api_key)?,
        })
    }

    pub async fn is_connected(&self) -> bool {
        match self.client.health().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Meilisearch health check failed");
                false
            }
        }
    }

    /// Creates the indices and applies their settings.
    ///
    /// Index creation is idempotent on the Meilisearch side: creating an
    /// existing index produces a failed task, not an error here.
    pub async fn initialize(&self) -> Result<(), SearchError> {
        if !self.is_connected().await {
            return Err(SearchError::Unavailable);
        }

        for index in [
            TASKS_INDEX,
            USERS_INDEX,
            CHARITIES_INDEX,
            TASK_APPLICATIONS_INDEX,
        ] {
            self.client.create_index(index, Some(PRIMARY_KEY)).await?;
            self.client
                .index(index)
                .set_settings(&index_settings(index))
                .await?;
            tracing::info!(index, "Search index configured");
        }

        Ok(())
    }

    /// Adds or replaces one document after flattening it
    pub async fn index_document(&self, index: &str, document: &Value) -> Result<(), SearchError> {
        let prepared = prepare_document(document).ok_or(SearchError::InvalidDocument)?;
        if prepared.get(PRIMARY_KEY).is_none() {
            return Err(SearchError::InvalidDocument);
        }

        self.client
            .index(index)
            .add_or_update(&[Value::Object(prepared)], Some(PRIMARY_KEY))
            .await?;

        tracing::debug!(index, "Document queued for indexing");
        Ok(())
    }

    pub async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchError> {
        self.client.index(index).delete_document(id).await?;
        tracing::debug!(index, id, "Document queued for deletion");
        Ok(())
    }

    /// Searches tasks, users and charities with the same query.
    ///
    /// Users without a role (onboarding not finished) are dropped.
    pub async fn search_all(&self, query: &str) -> Result<SearchResults, SearchError> {
        let query = validate_query(query)?;

        if !self.is_connected().await {
            return Err(SearchError::Unavailable);
        }

        let (tasks, users, charities) = tokio::try_join!(
            self.search_index(TASKS_INDEX, query),
            self.search_index(USERS_INDEX, query),
            self.search_index(CHARITIES_INDEX, query),
        )?;

        let users: Vec<Value> = users.into_iter().filter(has_role).collect();

        let documents = tasks
            .iter()
            .map(|hit| (TASKS_INDEX, hit))
            .chain(users.iter().map(|hit| (USERS_INDEX, hit)))
            .chain(charities.iter().map(|hit| (CHARITIES_INDEX, hit)))
            .map(|(collection, data)| SearchHit {
                collection,
                data: data.clone(),
            })
            .collect();

        Ok(SearchResults {
            tasks,
            users,
            charities,
            documents,
        })
    }

    async fn search_index(&self, index: &str, query: &str) -> Result<Vec<Value>, SearchError> {
        let results = self
            .client
            .index(index)
            .search()
            .with_query(query)
            .with_limit(SEARCH_LIMIT)
            .execute::<Value>()
            .await?;

        Ok(results.hits.into_iter().map(|hit| hit.result).collect())
    }
}

/// Trims the query and checks its length
pub fn validate_query(query: &str) -> Result<&str, SearchError> {
    let trimmed = query.trim();
    let len = trimmed.chars().count();
    if !(MIN_QUERY_LEN..=MAX_QUERY_LEN).contains(&len) {
        return Err(SearchError::InvalidQuery);
    }
    Ok(trimmed)
}

/// Flattens a document for indexing.
///
/// Nested objects and non-empty arrays of objects are replaced by their JSON
/// text. Returns `None` if `document` is not an object.
pub fn prepare_document(document: &Value) -> Option<Map<String, Value>> {
    let object = document.as_object()?;
    Some(
        object
            .iter()
            .map(|(key, value)| {
                let prepared = match value {
                    Value::Object(_) => Value::String(value.to_string()),
                    Value::Array(items) if items.first().is_some_and(Value::is_object) => {
                        Value::String(value.to_string())
                    }
                    _ => value.clone(),
                };
                (key.clone(), prepared)
            })
            .collect(),
    )
}

fn has_role(user: &Value) -> bool {
    user.get("roles")
        .and_then(Value::as_array)
        .and_then(|roles| roles.first())
        .is_some_and(|role| !role.is_null())
}

fn index_settings(index: &str) -> Settings {
    match index {
        TASKS_INDEX => Settings::new()
            .with_searchable_attributes([
                "title",
                "description",
                "impact",
                "required_skills",
                "category",
                "deliverables",
                "location",
                "resources",
            ])
            .with_filterable_attributes([
                "id",
                "category",
                "required_skills",
                "urgency",
                "status",
                "charity_id",
                "created_by",
                "location",
                "volunteers_needed",
            ])
            .with_sortable_attributes(["deadline", "created_at", "updated_at", "volunteers_needed"]),
        USERS_INDEX => Settings::new()
            .with_searchable_attributes([
                "name",
                "skills",
                "bio",
                "user_title",
                "preferred_charities",
            ])
            .with_filterable_attributes(["id", "skills", "roles", "preferred_charities"])
            .with_sortable_attributes(["created_at", "updated_at"]),
        CHARITIES_INDEX => Settings::new()
            .with_searchable_attributes(["name", "description", "website", "contact_email", "tags"])
            .with_filterable_attributes(["id", "tags"])
            .with_sortable_attributes(["created_at", "updated_at"]),
        _ => Settings::new()
            .with_searchable_attributes(["task_id", "user_id", "status"])
            .with_filterable_attributes(["id", "task_id", "user_id", "status"])
            .with_sortable_attributes(["created_at", "updated_at"]),
    }
}
