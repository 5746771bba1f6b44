/// Outbox of side effects for the worker
///
/// Handlers that change data enqueue follow-up work here (search indexing,
/// notification topics, triggers, subscriber management). The worker claims
/// rows and performs the external calls, retrying with backoff.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE outbox_status AS ENUM ('pending', 'running', 'done', 'failed');
///
/// CREATE TABLE outbox_jobs (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     kind TEXT NOT NULL,
///     payload JSONB NOT NULL,
///     status outbox_status NOT NULL DEFAULT 'pending',
///     attempts INTEGER NOT NULL DEFAULT 0,
///     last_error TEXT,
///     run_after TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, PgExecutor};
use uuid::Uuid;

use crate::integrations::notifications::TriggerRequest;

pub const OUTBOX_COLUMNS: &str =
    "id, kind, payload, status, attempts, last_error, run_after, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "outbox_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Running => "running",
            OutboxStatus::Done => "done",
            OutboxStatus::Failed => "failed",
        }
    }
}

/// Work the worker knows how to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    IndexDocument {
        index: String,
        document: serde_json::Value,
    },
    DeleteDocument {
        index: String,
        id: String,
    },
    CreateTopic {
        key: String,
        name: String,
    },
    SubscribeToTopic {
        key: String,
        subscriber_ids: Vec<String>,
    },
    Notify(TriggerRequest),
    CreateSubscriber {
        subscriber_id: String,
        email: String,
        first_name: String,
        last_name: String,
    },
    DeleteSubscriber {
        subscriber_id: String,
    },
}

impl JobPayload {
    /// Value stored in the `kind` column
    pub fn kind(&self) -> &'static str {
        match self {
            JobPayload::IndexDocument { .. } => "index_document",
            JobPayload::DeleteDocument { .. } => "delete_document",
            JobPayload::CreateTopic { .. } => "create_topic",
            JobPayload::SubscribeToTopic { .. } => "subscribe_to_topic",
            JobPayload::Notify(_) => "notify",
            JobPayload::CreateSubscriber { .. } => "create_subscriber",
            JobPayload::DeleteSubscriber { .. } => "delete_subscriber",
        }
    }

    pub fn is_search(&self) -> bool {
        matches!(
            self,
            JobPayload::IndexDocument { .. } | JobPayload::DeleteDocument { .. }
        )
    }
}

/// A row of `outbox_jobs`.
///
/// `payload` stays raw JSON so that one malformed row cannot fail a whole
/// claim; call [`OutboxJob::decode_payload`] per job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxJob {
    pub id: Uuid,
    pub kind: String,
    pub payload: Json<serde_json::Value>,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub run_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboxJob {
    pub fn decode_payload(&self) -> Result<JobPayload, serde_json::Error> {
        JobPayload::deserialize(&self.payload.0)
    }

    /// Enqueues a job. Pass a transaction to tie it to the write it follows.
    pub async fn enqueue<'e, E: PgExecutor<'e>>(
        executor: E,
        payload: JobPayload,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO outbox_jobs (kind, payload) VALUES ($1, $2) RETURNING {OUTBOX_COLUMNS}"
        );

        let job = sqlx::query_as::<_, OutboxJob>(&query)
            .bind(payload.kind())
            .bind(Json(&payload))
            .fetch_one(executor)
            .await?;

        tracing::debug!(job_id = %job.id, kind = %job.kind, "Outbox job enqueued");
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_tagged_serialization() {
        let payload = JobPayload::DeleteDocument {
            index: "skillanthropy_tasks".to_string(),
            id: "abc".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "delete_document");
        assert_eq!(json["index"], "skillanthropy_tasks");

        let back: JobPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    fn job_with(payload: serde_json::Value) -> OutboxJob {
        OutboxJob {
            id: Uuid::new_v4(),
            kind: "create_topic".to_string(),
            payload: Json(payload),
            status: OutboxStatus::Running,
            attempts: 1,
            last_error: None,
            run_after: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_decode_payload() {
        let job = job_with(serde_json::json!({
            "type": "create_topic",
            "key": "charity:admins:1",
            "name": "Admins"
        }));
        assert_eq!(
            job.decode_payload().unwrap(),
            JobPayload::CreateTopic {
                key: "charity:admins:1".to_string(),
                name: "Admins".to_string(),
            }
        );

        let missing_key = job_with(serde_json::json!({ "type": "create_topic" }));
        assert!(missing_key.decode_payload().is_err());

        let unknown = job_with(serde_json::json!({ "type": "launch_rocket" }));
        assert!(unknown.decode_payload().is_err());
    }

    #[test]
    fn test_kind_matches_tag() {
        let payloads = vec![
            JobPayload::CreateTopic {
                key: "charity:admins:1".to_string(),
                name: "Admins".to_string(),
            },
            JobPayload::SubscribeToTopic {
                key: "tasks:volunteers:1".to_string(),
                subscriber_ids: vec!["u1".to_string()],
            },
            JobPayload::DeleteSubscriber {
                subscriber_id: "u1".to_string(),
            },
        ];
        for payload in payloads {
            let json = serde_json::to_value(&payload).unwrap();
            assert_eq!(json["type"], payload.kind());
            assert!(!payload.is_search());
        }
    }
}
