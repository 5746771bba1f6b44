/// Performs notification jobs against Novu: topics, subscribers and
/// workflow triggers.
use super::{HandlerError, HandlerResult, JobHandler};
use altruvist_shared::integrations::notifications::NovuClient;
use altruvist_shared::models::outbox::JobPayload;
use async_trait::async_trait;

const KINDS: [&str; 5] = [
    "create_topic",
    "subscribe_to_topic",
    "notify",
    "create_subscriber",
    "delete_subscriber",
];

pub struct NotificationHandler {
    client: NovuClient,
}

impl NotificationHandler {
    pub fn new(client: NovuClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobHandler for NotificationHandler {
    fn name(&self) -> &str {
        "notification"
    }

    fn handles(&self, kind: &str) -> bool {
        KINDS.contains(&kind)
    }

    async fn handle(&self, payload: &JobPayload) -> HandlerResult<()> {
        match payload {
            JobPayload::CreateTopic { key, name } => self.client.create_topic(key, name).await?,
            JobPayload::SubscribeToTopic {
                key,
                subscriber_ids,
            } => {
                if subscriber_ids.is_empty() {
                    return Ok(());
                }
                self.client
                    .add_subscribers_to_topic(key, subscriber_ids)
                    .await?
            }
            JobPayload::Notify(request) => self.client.trigger(request).await?,
            JobPayload::CreateSubscriber {
                subscriber_id,
                email,
                first_name,
                last_name,
            } => {
                self.client
                    .create_subscriber(subscriber_id, email, first_name, last_name)
                    .await?
            }
            JobPayload::DeleteSubscriber { subscriber_id } => {
                self.client.delete_subscriber(subscriber_id).await?
            }
            other => {
                return Err(HandlerError::Unsupported {
                    handler: "notification",
                    kind: other.kind(),
                })
            }
        }
        Ok(())
    }
}
