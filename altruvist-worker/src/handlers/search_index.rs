/// Keeps the Meilisearch indices in step with the database
use super::{HandlerError, HandlerResult, JobHandler};
use altruvist_shared::integrations::search::SearchClient;
use altruvist_shared::models::outbox::JobPayload;
use async_trait::async_trait;
use std::sync::Arc;

pub struct SearchIndexHandler {
    client: Arc<SearchClient>,
}

impl SearchIndexHandler {
    pub fn new(client: Arc<SearchClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobHandler for SearchIndexHandler {
    fn name(&self) -> &str {
        "search_index"
    }

    fn handles(&self, kind: &str) -> bool {
        matches!(kind, "index_document" | "delete_document")
    }

    async fn handle(&self, payload: &JobPayload) -> HandlerResult<()> {
        match payload {
            JobPayload::IndexDocument { index, document } => {
                self.client.index_document(index, document).await?;
            }
            JobPayload::DeleteDocument { index, id } => {
                self.client.delete_document(index, id).await?;
            }
            other => {
                return Err(HandlerError::Unsupported {
                    handler: "search_index",
                    kind: other.kind(),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> SearchIndexHandler {
        let client = SearchClient::new("http://localhost:7700", None).unwrap();
        SearchIndexHandler::new(Arc::new(client))
    }

    #[test]
    fn test_handles_search_kinds() {
        let handler = handler();
        assert!(handler.handles("index_document"));
        assert!(handler.handles("delete_document"));
        assert!(!handler.handles("notify"));
        assert!(!handler.handles("create_topic"));
    }

    #[tokio::test]
    async fn test_rejects_other_payloads() {
        let result = handler()
            .handle(&JobPayload::DeleteSubscriber {
                subscriber_id: "u1".to_string(),
            })
            .await;

        assert!(matches!(
            result,
            Err(HandlerError::Unsupported {
                kind: "delete_subscriber",
                ..
            })
        ));
    }
}
