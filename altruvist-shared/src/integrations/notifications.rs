/// Novu notification client.
///
/// Talks to the Novu REST API directly through `reqwest`. Writes (topics,
/// subscribers, triggers) are performed by the worker from outbox jobs; the
/// in-app feed endpoints are called synchronously by the API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.novu.co";

/// Workflow identifiers configured in Novu
pub mod workflows {
    pub const APPLICATIONS_FEED: &str = "applications-feed";
    pub const COMMENTS_FEED: &str = "comments-feed";
    pub const CHARITIES_FEED: &str = "charities-feed";
    pub const ACTIVITY_FEED: &str = "activity-feed";
}

/// Topic keys derived from entity ids
pub mod topics {
    use uuid::Uuid;

    pub fn task_charities(task_id: Uuid) -> String {
        format!("tasks:charities:{task_id}")
    }

    pub fn task_volunteers(task_id: Uuid) -> String {
        format!("tasks:volunteers:{task_id}")
    }

    pub fn charity_admins(charity_id: Uuid) -> String {
        format!("charity:admins:{charity_id}")
    }

    pub fn charity_coordinators(charity_id: Uuid) -> String {
        format!("charity:coordinators:{charity_id}")
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Missing topic key for topic notification")]
    MissingTopicKey,

    #[error("Novu request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Novu API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

/// Who a notification goes to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Recipient {
    Subscriber {
        #[serde(rename = "subscriberId")]
        subscriber_id: String,
        email: String,
        #[serde(rename = "firstName")]
        first_name: String,
        #[serde(rename = "lastName")]
        last_name: String,
    },
    Topic {
        #[serde(rename = "topicKey", default, skip_serializing_if = "Option::is_none")]
        topic_key: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Message,
    Alert,
    Update,
    Applied,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationBody {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<NotificationKind>,
    pub avatar: Option<String>,
    pub task_application_id: Option<String>,
    pub user_id: Option<String>,
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub subject: String,
    pub body: NotificationBody,
}

/// A workflow trigger, ready to send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub workflow_id: String,
    pub to: Recipient,
    pub payload: NotificationPayload,
}

impl TriggerRequest {
    pub fn to_topic(workflow_id: &str, topic_key: impl Into<String>, payload: NotificationPayload) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            to: Recipient::Topic {
                topic_key: Some(topic_key.into()),
            },
            payload,
        }
    }

    pub fn to_subscriber(
        workflow_id: &str,
        subscriber_id: impl Into<String>,
        email: impl Into<String>,
        full_name: &str,
        payload: NotificationPayload,
    ) -> Self {
        let (first_name, last_name) = split_name(full_name);
        Self {
            workflow_id: workflow_id.to_string(),
            to: Recipient::Subscriber {
                subscriber_id: subscriber_id.into(),
                email: email.into(),
                first_name,
                last_name,
            },
            payload,
        }
    }
}

/// First word and the remainder of a display name
pub fn split_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

/// In-app feed entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationItem {
    pub id: String,
    pub title: String,
    pub content: String,
    pub timestamp: String,
    pub read: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub link: Option<String>,
    pub template_id: Option<String>,
}

impl NotificationItem {
    fn from_feed(raw: &Value) -> Option<Self> {
        let template_id = raw
            .get("templateIdentifier")
            .or_else(|| raw.get("templateId"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(Self {
            id: raw.get("_id")?.as_str()?.to_string(),
            title: raw
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("Notification")
                .to_string(),
            content: raw
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            timestamp: raw
                .get("createdAt")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            read: raw.get("read").and_then(Value::as_bool).unwrap_or(false),
            kind: map_template_to_type(&template_id).to_string(),
            link: extract_action_url(raw),
            template_id: (!template_id.is_empty()).then_some(template_id),
        })
    }
}

/// Feed type for a Novu template; unknown templates are alerts
pub fn map_template_to_type(template_id: &str) -> &'static str {
    match template_id {
        "message_received" => "message",
        "system_alert" => "alert",
        "project_update" => "update",
        "collaboration_invite" => "invitation",
        _ => "alert",
    }
}

/// URL of the first redirect action, if any
pub fn extract_action_url(notification: &Value) -> Option<String> {
    let cta = notification.get("cta")?;
    let actions: Vec<&Value> = match cta {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    actions
        .into_iter()
        .find(|action| action.get("type").and_then(Value::as_str) == Some("redirect"))
        .and_then(|action| action.pointer("/data/url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Clone)]
pub struct NovuClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NovuClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("Authorization", format!("ApiKey {}", self.api_key))
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value, NotificationError> {
        let resp = builder.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(NotificationError::Api { status, message });
        }
        Ok(resp.json().await.unwrap_or(Value::Null))
    }

    /// Triggers a workflow for a subscriber or a topic
    pub async fn trigger(&self, request: &TriggerRequest) -> Result<(), NotificationError> {
        if let Recipient::Topic { topic_key: None } = &request.to {
            tracing::error!(workflow = %request.workflow_id, "Missing topic key for topic notification");
            return Err(NotificationError::MissingTopicKey);
        }

        self.send(
            self.request(reqwest::Method::POST, "/events/trigger")
                .json(&serde_json::json!({
                    "name": request.workflow_id,
                    "to": [request.to],
                    "payload": request.payload,
                })),
        )
        .await?;

        tracing::info!(workflow = %request.workflow_id, "Notification triggered");
        Ok(())
    }

    pub async fn create_topic(&self, key: &str, name: &str) -> Result<(), NotificationError> {
        self.send(
            self.request(reqwest::Method::POST, "/topics")
                .json(&serde_json::json!({ "key": key, "name": name })),
        )
        .await?;
        tracing::info!(topic = key, "Created notification topic");
        Ok(())
    }

    pub async fn add_subscribers_to_topic(
        &self,
        key: &str,
        subscriber_ids: &[String],
    ) -> Result<(), NotificationError> {
        let path = format!("/topics/{}/subscribers", urlencoding::encode(key));
        self.send(
            self.request(reqwest::Method::POST, &path)
                .json(&serde_json::json!({ "subscribers": subscriber_ids })),
        )
        .await?;
        tracing::debug!(topic = key, count = subscriber_ids.len(), "Subscribers added to topic");
        Ok(())
    }

    pub async fn create_subscriber(
        &self,
        subscriber_id: &str,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<(), NotificationError> {
        self.send(
            self.request(reqwest::Method::POST, "/subscribers")
                .json(&serde_json::json!({
                    "subscriberId": subscriber_id,
                    "email": email,
                    "firstName": first_name,
                    "lastName": last_name,
                })),
        )
        .await?;
        tracing::info!(subscriber_id, "Created notification subscriber");
        Ok(())
    }

    pub async fn delete_subscriber(&self, subscriber_id: &str) -> Result<(), NotificationError> {
        let path = format!("/subscribers/{}", urlencoding::encode(subscriber_id));
        self.send(self.request(reqwest::Method::DELETE, &path)).await?;
        tracing::info!(subscriber_id, "Deleted notification subscriber");
        Ok(())
    }

    /// First page (20 items) of a subscriber's in-app feed
    pub async fn list_notifications(
        &self,
        subscriber_id: &str,
    ) -> Result<Vec<NotificationItem>, NotificationError> {
        let path = format!(
            "/subscribers/{}/notifications/feed",
            urlencoding::encode(subscriber_id)
        );
        let body = self
            .send(
                self.request(reqwest::Method::GET, &path)
                    .query(&[("page", "0"), ("limit", "20")]),
            )
            .await?;

        Ok(body
            .get("data")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(NotificationItem::from_feed).collect())
            .unwrap_or_default())
    }

    pub async fn mark_as_read(
        &self,
        subscriber_id: &str,
        message_id: &str,
    ) -> Result<(), NotificationError> {
        let path = format!(
            "/subscribers/{}/messages/mark-as",
            urlencoding::encode(subscriber_id)
        );
        self.send(
            self.request(reqwest::Method::POST, &path)
                .json(&serde_json::json!({ "messageId": message_id, "markAs": "read" })),
        )
        .await?;
        Ok(())
    }

    pub async fn mark_all_as_read(&self, subscriber_id: &str) -> Result<(), NotificationError> {
        let path = format!(
            "/subscribers/{}/messages/mark-all",
            urlencoding::encode(subscriber_id)
        );
        self.send(
            self.request(reqwest::Method::POST, &path)
                .json(&serde_json::json!({ "markAs": "read" })),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<(), NotificationError> {
        let path = format!("/messages/{}", urlencoding::encode(message_id));
        self.send(self.request(reqwest::Method::DELETE, &path)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_topic_keys() {
        let id = Uuid::nil();
        assert_eq!(
            topics::task_charities(id),
            "tasks:charities:00000000-0000-0000-0000-000000000000"
        );
        assert!(topics::task_volunteers(id).starts_with("tasks:volunteers:"));
        assert!(topics::charity_admins(id).starts_with("charity:admins:"));
        assert!(topics::charity_coordinators(id).starts_with("charity:coordinators:"));
    }

    #[test]
    fn test_template_mapping() {
        assert_eq!(map_template_to_type("message_received"), "message");
        assert_eq!(map_template_to_type("system_alert"), "alert");
        assert_eq!(map_template_to_type("project_update"), "update");
        assert_eq!(map_template_to_type("collaboration_invite"), "invitation");
        assert_eq!(map_template_to_type("something_new"), "alert");
    }

    #[test]
    fn test_extract_action_url() {
        let notification = json!({
            "cta": [
                {"type": "button", "data": {"url": "/ignored"}},
                {"type": "redirect", "data": {"url": "/tasks/1"}}
            ]
        });
        assert_eq!(extract_action_url(&notification), Some("/tasks/1".to_string()));

        let single = json!({"cta": {"type": "redirect", "data": {"url": "/charities/2"}}});
        assert_eq!(extract_action_url(&single), Some("/charities/2".to_string()));

        assert_eq!(extract_action_url(&json!({})), None);
    }

    #[test]
    fn test_feed_item_defaults() {
        let raw = json!({"_id": "m1", "createdAt": "2026-10-01T10:00:00Z"});
        let item = NotificationItem::from_feed(&raw).unwrap();
        assert_eq!(item.title, "Notification");
        assert_eq!(item.content, "");
        assert!(!item.read);
        assert_eq!(item.kind, "alert");
        assert_eq!(item.template_id, None);

        assert!(NotificationItem::from_feed(&json!({"title": "no id"})).is_none());
    }

    #[test]
    fn test_recipient_wire_format() {
        let request = TriggerRequest::to_subscriber(
            workflows::APPLICATIONS_FEED,
            "u1",
            "ada@example.com",
            "Ada King Lovelace",
            NotificationPayload {
                subject: "Application approved".to_string(),
                body: NotificationBody {
                    message: "You're in".to_string(),
                    kind: Some(NotificationKind::Approved),
                    ..Default::default()
                },
            },
        );

        let to = serde_json::to_value(&request.to).unwrap();
        assert_eq!(to["type"], "Subscriber");
        assert_eq!(to["subscriberId"], "u1");
        assert_eq!(to["firstName"], "Ada");
        assert_eq!(to["lastName"], "King Lovelace");

        let body = serde_json::to_value(&request.payload.body).unwrap();
        assert_eq!(body["type"], "approved");

        let topic = serde_json::to_value(Recipient::Topic {
            topic_key: Some("tasks:charities:1".to_string()),
        })
        .unwrap();
        assert_eq!(topic, json!({"type": "Topic", "topicKey": "tasks:charities:1"}));
    }

    #[tokio::test]
    async fn test_topic_trigger_without_key_is_rejected() {
        let client = NovuClient::new("http://127.0.0.1:9", "test-key");
        let request = TriggerRequest {
            workflow_id: workflows::ACTIVITY_FEED.to_string(),
            to: Recipient::Topic { topic_key: None },
            payload: NotificationPayload {
                subject: "Hi".to_string(),
                body: NotificationBody::default(),
            },
        };
        assert!(matches!(
            client.trigger(&request).await,
            Err(NotificationError::MissingTopicKey)
        ));
    }
}
