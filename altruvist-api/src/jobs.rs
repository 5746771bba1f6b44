/// Builders for outbox jobs enqueued by handlers
///
/// Handlers never call Meilisearch or Novu for writes; they enqueue a
/// [`JobPayload`] next to the database change and the worker performs it.

use altruvist_shared::integrations::notifications::{
    NotificationBody, NotificationKind, NotificationPayload,
};
use altruvist_shared::models::outbox::{JobPayload, OutboxJob};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Fields never sent to the search index, at any depth
const PRIVATE_FIELDS: &[&str] = &[
    "zitadel_id",
    "email",
    "notify_topic_ids",
    "creator_wallet_address",
    "volunteer_wallet_address",
];

fn strip_private(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for field in PRIVATE_FIELDS {
                map.remove(*field);
            }
            map.values_mut().for_each(strip_private);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_private),
        _ => {}
    }
}

pub fn index<T: Serialize>(index: &str, document: &T) -> ApiResult<JobPayload> {
    let mut document = serde_json::to_value(document).map_err(ApiError::internal)?;
    strip_private(&mut document);
    Ok(JobPayload::IndexDocument {
        index: index.to_string(),
        document,
    })
}

pub fn remove(index: &str, id: Uuid) -> JobPayload {
    JobPayload::DeleteDocument {
        index: index.to_string(),
        id: id.to_string(),
    }
}

/// Notification payload with a subject and message
pub fn notice(subject: &str, message: impl Into<String>) -> NotificationPayload {
    NotificationPayload {
        subject: subject.to_string(),
        body: NotificationBody {
            message: message.into(),
            ..Default::default()
        },
    }
}

pub fn with_kind(mut payload: NotificationPayload, kind: NotificationKind) -> NotificationPayload {
    payload.body.kind = Some(kind);
    payload
}

/// Enqueues `jobs` on an open connection or transaction
pub async fn enqueue_all(conn: &mut PgConnection, jobs: Vec<JobPayload>) -> Result<(), sqlx::Error> {
    for job in jobs {
        OutboxJob::enqueue(&mut *conn, job).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_index_strips_private_fields() {
        let job = index(
            "skillanthropy_users",
            &json!({ "id": "u1", "name": "Sam", "zitadel_id": "z-1" }),
        )
        .unwrap();

        match job {
            JobPayload::IndexDocument { index, document } => {
                assert_eq!(index, "skillanthropy_users");
                assert_eq!(document, json!({ "id": "u1", "name": "Sam" }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_index_strips_nested_private_fields() {
        let job = index(
            "skillanthropy_tasks",
            &json!({
                "id": "t1",
                "title": "Logo design",
                "creator_wallet_address": "0xabc",
                "notify_topic_ids": ["tasks:volunteers:t1"],
                "task_applications": [
                    { "id": "a1", "status": "ACCEPTED", "volunteer_wallet_address": "0xdef" }
                ]
            }),
        )
        .unwrap();

        let JobPayload::IndexDocument { document, .. } = job else {
            panic!("expected an index job");
        };
        assert_eq!(
            document,
            json!({
                "id": "t1",
                "title": "Logo design",
                "task_applications": [{ "id": "a1", "status": "ACCEPTED" }]
            })
        );

        let user = index(
            "skillanthropy_users",
            &json!({ "id": "u1", "name": "Sam", "email": "sam@example.org" }),
        )
        .unwrap();
        let JobPayload::IndexDocument { document, .. } = user else {
            panic!("expected an index job");
        };
        assert!(document.get("email").is_none());
    }

    #[test]
    fn test_notice_kind() {
        let payload = with_kind(notice("Application accepted", "Welcome aboard"), NotificationKind::Approved);
        assert_eq!(payload.subject, "Application accepted");
        assert_eq!(payload.body.message, "Welcome aboard");
        assert_eq!(payload.body.kind, Some(NotificationKind::Approved));
    }
}
