/// Outbox job handlers
///
/// | handler | kinds |
/// |---|---|
/// | [`SearchIndexHandler`] | `index_document`, `delete_document` |
/// | [`NotificationHandler`] | `create_topic`, `subscribe_to_topic`, `notify`, `create_subscriber`, `delete_subscriber` |

pub mod handler_trait;
pub mod notification;
pub mod search_index;

pub use handler_trait::{HandlerError, HandlerResult, JobHandler};
pub use notification::NotificationHandler;
pub use search_index::SearchIndexHandler;
