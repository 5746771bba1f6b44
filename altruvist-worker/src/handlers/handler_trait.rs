/// Job handler contract
///
/// A handler performs one family of outbox jobs against an external service.
/// The dispatcher picks the first registered handler whose [`JobHandler::handles`]
/// accepts the job's kind.
///
/// # Example
///
/// ```no_run
/// use altruvist_shared::models::outbox::JobPayload;
/// use altruvist_worker::handlers::{HandlerResult, JobHandler};
/// use async_trait::async_trait;
///
/// struct LogHandler;
///
/// #[async_trait]
/// impl JobHandler for LogHandler {
///     fn name(&self) -> &str {
///         "log"
///     }
///
///     fn handles(&self, kind: &str) -> bool {
///         kind == "create_topic"
///     }
///
///     async fn handle(&self, payload: &JobPayload) -> HandlerResult<()> {
///         println!("{payload:?}");
///         Ok(())
///     }
/// }
/// ```

use altruvist_shared::integrations::{notifications::NotificationError, search::SearchError};
use altruvist_shared::models::outbox::JobPayload;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    /// The handler was given a job kind it does not perform
    #[error("Handler {handler} cannot perform {kind} jobs")]
    Unsupported {
        handler: &'static str,
        kind: &'static str,
    },
}

impl HandlerError {
    /// Whether another attempt could succeed.
    ///
    /// Malformed jobs and 4xx answers other than 429 fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::Search(e) => e.is_retryable(),
            HandlerError::Notification(NotificationError::MissingTopicKey) => false,
            HandlerError::Notification(NotificationError::Api { status, .. }) => {
                *status == 429 || *status >= 500
            }
            HandlerError::Notification(NotificationError::Http(_)) => true,
            HandlerError::Unsupported { .. } => false,
        }
    }
}

pub type HandlerResult<T> = Result<T, HandlerError>;

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Whether this handler performs jobs of `kind` (the outbox `kind` column)
    fn handles(&self, kind: &str) -> bool;

    async fn handle(&self, payload: &JobPayload) -> HandlerResult<()>;
}
