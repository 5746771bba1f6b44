/// Error handling for the API server
///
/// Handlers return `ApiResult<T>`. Every library error converts into
/// [`ApiError`], which renders as `{error, message, details?}` with the
/// matching status code.
///
/// # Example
///
/// ```no_run
/// use altruvist_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler() -> ApiResult<Json<serde_json::Value>> {
///     Err(ApiError::NotFound("Task not found".to_string()))
/// }
/// ```

use altruvist_shared::auth::authorization::AuthzError;
use altruvist_shared::auth::jwt::JwtError;
use altruvist_shared::auth::middleware::AuthError;
use altruvist_shared::auth::oidc::OidcError;
use altruvist_shared::integrations::notifications::NotificationError;
use altruvist_shared::integrations::search::SearchError;
use altruvist_shared::integrations::storage::StorageError;
use altruvist_shared::models::charity_application::ApplicationReviewError;
use altruvist_shared::models::comment::CommentError;
use altruvist_shared::models::task::TaskQueryError;
use altruvist_shared::models::task_application::TaskApplicationError;
use altruvist_shared::redis::RedisClientError;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// 400
    BadRequest(String),

    /// 401
    Unauthorized(String),

    /// 403
    Forbidden(String),

    /// 404
    NotFound(String),

    /// 409
    Conflict(String),

    /// 422
    ValidationError(Vec<ValidationErrorDetail>),

    /// 429
    RateLimitExceeded { retry_after: u64, message: String },

    /// 500; the message is logged, never returned
    InternalError(String),

    /// 503
    ServiceUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code such as `not_found`
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            ApiError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ApiError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::RateLimitExceeded { message, .. } => {
                write!(f, "Rate limit exceeded: {message}")
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {msg}"),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            ApiError::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        };

        let (error_code, message, details) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::Unauthorized(msg) => ("unauthorized", msg, None),
            ApiError::Forbidden(msg) => ("forbidden", msg, None),
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::Conflict(msg) => ("conflict", msg, None),
            ApiError::ValidationError(errors) => (
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::RateLimitExceeded { message, .. } => ("rate_limit_exceeded", message, None),
            ApiError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ("internal_error", "An internal error occurred".to_string(), None)
            }
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg, None),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(secs));
        }
        response
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                ApiError::Conflict("Resource already exists".to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                ApiError::BadRequest("Referenced resource does not exist".to_string())
            }
            other => ApiError::InternalError(format!("Database error: {other}")),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| ValidationErrorDetail {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid {field}")),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}

impl From<validator::ValidationError> for ApiError {
    fn from(err: validator::ValidationError) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: err.code.to_string(),
            message: err
                .message
                .map(|m| m.to_string())
                .unwrap_or_else(|| "Invalid value".to_string()),
        }])
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => ApiError::Unauthorized("Missing credentials".to_string()),
            AuthError::InvalidFormat(msg) => ApiError::BadRequest(msg),
            AuthError::InvalidToken(msg) => ApiError::Unauthorized(msg),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::DatabaseError(e) => e.into(),
            other => ApiError::Forbidden(other.to_string()),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer => ApiError::Unauthorized("Invalid token issuer".to_string()),
            JwtError::CreateError(msg) => ApiError::InternalError(msg),
            other => ApiError::Unauthorized(format!("Invalid token: {other}")),
        }
    }
}

impl From<OidcError> for ApiError {
    fn from(err: OidcError) -> Self {
        match err {
            OidcError::InvalidState => ApiError::BadRequest(err.to_string()),
            OidcError::Provider { .. } => ApiError::Unauthorized(err.to_string()),
            OidcError::Http(_) => ApiError::ServiceUnavailable("Identity provider unavailable".to_string()),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<RedisClientError> for ApiError {
    fn from(err: RedisClientError) -> Self {
        ApiError::InternalError(format!("Redis error: {err}"))
    }
}

impl From<TaskApplicationError> for ApiError {
    fn from(err: TaskApplicationError) -> Self {
        match err {
            TaskApplicationError::AlreadyApplied => ApiError::Conflict(err.to_string()),
            TaskApplicationError::NoSpotsRemaining => ApiError::BadRequest(err.to_string()),
            TaskApplicationError::TaskNotFound | TaskApplicationError::NotFound => {
                ApiError::NotFound(err.to_string())
            }
            TaskApplicationError::Database(e) => e.into(),
        }
    }
}

impl From<CommentError> for ApiError {
    fn from(err: CommentError) -> Self {
        match err {
            CommentError::EmptyContent | CommentError::ParentTaskMismatch => {
                ApiError::BadRequest(err.to_string())
            }
            CommentError::NotFound | CommentError::ParentNotFound => ApiError::NotFound(err.to_string()),
            CommentError::Database(e) => e.into(),
        }
    }
}

impl From<ApplicationReviewError> for ApiError {
    fn from(err: ApplicationReviewError) -> Self {
        match err {
            ApplicationReviewError::NotFound => ApiError::NotFound(err.to_string()),
            ApplicationReviewError::AlreadyReviewed => ApiError::BadRequest(err.to_string()),
            ApplicationReviewError::Database(e) => e.into(),
        }
    }
}

impl From<TaskQueryError> for ApiError {
    fn from(err: TaskQueryError) -> Self {
        match err {
            TaskQueryError::InvalidStatus(_) => ApiError::BadRequest(err.to_string()),
            TaskQueryError::Database(e) => e.into(),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidQuery => ApiError::BadRequest(err.to_string()),
            SearchError::Unavailable => ApiError::ServiceUnavailable(err.to_string()),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::Api { status: 404, .. } => {
                ApiError::NotFound("Notification not found".to_string())
            }
            NotificationError::Http(_) => {
                ApiError::ServiceUnavailable("Notification service unavailable".to_string())
            }
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::EmptyKey => ApiError::BadRequest(err.to_string()),
            StorageError::ObjectStore(e) => ApiError::InternalError(format!("Object storage error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = ApiError::RateLimitExceeded {
            retry_after: 12,
            message: "Slow down".to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["Retry-After"], "12");
    }

    #[test]
    fn test_row_not_found_is_404() {
        assert_eq!(ApiError::from(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_domain_error_mapping() {
        assert_eq!(
            ApiError::from(TaskApplicationError::AlreadyApplied).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(TaskApplicationError::NoSpotsRemaining).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(CommentError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(AuthzError::NotMember).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(SearchError::InvalidQuery).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(TaskQueryError::InvalidStatus("NOPE".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(OidcError::InvalidState).status(), StatusCode::BAD_REQUEST);
    }

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 2, message = "Too short"))]
        name: String,
    }

    #[test]
    fn test_validation_details() {
        let err: ApiError = Sample { name: "x".to_string() }.validate().unwrap_err().into();
        match err {
            ApiError::ValidationError(details) => {
                assert_eq!(
                    details,
                    vec![ValidationErrorDetail {
                        field: "name".to_string(),
                        message: "Too short".to_string()
                    }]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
