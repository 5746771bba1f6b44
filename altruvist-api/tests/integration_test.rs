/// End-to-end tests for the Altruvist API
///
/// These drive the router in-process against real Postgres and Redis:
/// - authentication and health
/// - onboarding a charity user
/// - task creation, applications and acceptance
/// - membership rules
/// - comment threads
///
/// Run with `cargo test -p altruvist-api -- --ignored` once `DATABASE_URL`
/// and `REDIS_URL` point at disposable instances.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::TestContext;
use serde_json::{json, Value};
use uuid::Uuid;

/// Onboards `user` as a charity user and returns the new charity's id
async fn onboard_charity(ctx: &TestContext, user: &altruvist_shared::models::user::User) -> String {
    let (status, body) = ctx
        .send(
            Method::POST,
            "/v1/users/me/onboarding",
            Some(user),
            Some(json!({
                "role": "charity",
                "user_title": "Director",
                "charity": {
                    "name": "River Cleanup",
                    "description": "Keeping the riverbanks clean",
                    "tags": ["Environment"],
                }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "onboarding failed: {body}");
    body["charity"]["id"].as_str().unwrap().to_string()
}

async fn create_task(ctx: &TestContext, user: &altruvist_shared::models::user::User, charity_id: &str, needed: i32) -> Value {
    let (status, body) = ctx
        .send(
            Method::POST,
            "/v1/tasks",
            Some(user),
            Some(json!({
                "title": "Design a flyer",
                "description": "A flyer for the spring cleanup event",
                "impact": "More volunteers at the event",
                "charity_id": charity_id,
                "required_skills": ["Design"],
                "category": ["Environment"],
                "volunteers_needed": needed,
                "deliverables": ["Print-ready PDF"],
                "deadline": (Utc::now() + Duration::days(14)).to_rfc3339(),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "task creation failed: {body}");
    body
}

#[tokio::test]
#[ignore = "requires Postgres and Redis"]
async fn test_health_and_auth_required() {
    let Some(ctx) = TestContext::new().await else {
        return;
    };

    let (status, body) = ctx.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");

    let (status, body) = ctx.send(Method::GET, "/v1/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
#[ignore = "requires Postgres and Redis"]
async fn test_charity_onboarding() {
    let Some(ctx) = TestContext::new().await else {
        return;
    };
    let user = ctx.user("Avery Stone").await;

    let (status, body) = ctx
        .send(
            Method::POST,
            "/v1/users/me/onboarding",
            Some(&user),
            Some(json!({ "role": "charity", "user_title": "Director" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let charity_id = onboard_charity(&ctx, &user).await;

    let (status, me) = ctx.send(Method::GET, "/v1/users/me", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user"]["roles"], json!(["charity"]));
    assert_eq!(me["memberships"][0]["roles"], json!(["admin"]));
    assert_eq!(me["charities"][0]["id"], charity_id.as_str());

    let admins_topic = format!("charity:admins:{charity_id}");
    assert_eq!(ctx.outbox_count("create_topic", "key", &admins_topic).await, 1);
    assert_eq!(ctx.outbox_count("subscribe_to_topic", "key", &admins_topic).await, 1);

    // A second onboarding is refused
    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/users/me/onboarding",
            Some(&user),
            Some(json!({ "role": "volunteer", "user_title": "Helper", "skills": ["Design"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

/// Notify jobs sent to a task's managers about one application
async fn manager_notices(ctx: &TestContext, task_id: &str, application_id: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM outbox_jobs WHERE kind = 'notify' \
         AND payload -> 'to' ->> 'topicKey' = $1 \
         AND payload -> 'payload' -> 'body' ->> 'taskApplicationId' = $2",
    )
    .bind(format!("tasks:charities:{task_id}"))
    .bind(application_id)
    .fetch_one(&ctx.db)
    .await
    .expect("Failed to count notifications")
}

#[tokio::test]
#[ignore = "requires Postgres and Redis"]
async fn test_task_application_flow() {
    let Some(ctx) = TestContext::new().await else {
        return;
    };
    let admin = ctx.user("Avery Stone").await;
    let volunteer = ctx.user("Jordan Lee").await;
    let outsider = ctx.user("Casey Park").await;
    let charity_id = onboard_charity(&ctx, &admin).await;

    let task = create_task(&ctx, &admin, &charity_id, 1).await;
    let task_id = task["id"].as_str().unwrap();
    assert_eq!(task["status"], "NOT_STARTED");
    assert_eq!(
        ctx.outbox_count("create_topic", "key", &format!("tasks:volunteers:{task_id}")).await,
        1
    );

    // Only charity members with a posting role may create tasks
    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/tasks",
            Some(&outsider),
            Some(json!({
                "title": "Nope",
                "description": "Should be refused",
                "impact": "None",
                "charity_id": charity_id,
                "required_skills": ["Design"],
                "category": ["Environment"],
                "volunteers_needed": 1,
                "deliverables": ["Nothing"],
                "deadline": (Utc::now() + Duration::days(3)).to_rfc3339(),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/v1/tasks/{task_id}/applications");
    let (status, application) = ctx
        .send(Method::POST, &uri, Some(&volunteer), Some(json!({ "message": "Happy to help" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(application["status"], "PENDING");

    let (status, body) = ctx
        .send(Method::POST, &uri, Some(&volunteer), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "User has already applied for this task");

    // Applicants cannot see the application list
    let (status, _) = ctx.send(Method::GET, &uri, Some(&volunteer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, list) = ctx.send(Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["applicant_name"], "Jordan Lee");

    let application_id = application["id"].as_str().unwrap();
    let action_uri = format!("/v1/applications/{application_id}");

    let (status, _) = ctx
        .send(Method::PATCH, &action_uri, Some(&volunteer), Some(json!({ "action": "accept" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, accepted) = ctx
        .send(Method::PATCH, &action_uri, Some(&admin), Some(json!({ "action": "accept" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "ACCEPTED");

    // The single spot is taken
    let second = ctx.user("Riley Quinn").await;
    let (_, other) = ctx.send(Method::POST, &uri, Some(&second), Some(json!({}))).await;
    let other_uri = format!("/v1/applications/{}", other["id"].as_str().unwrap());
    let (status, _) = ctx
        .send(Method::PATCH, &other_uri, Some(&admin), Some(json!({ "action": "accept" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Undoing a rejection notifies the task's managers again
    let other_id = other["id"].as_str().unwrap();
    assert_eq!(manager_notices(&ctx, task_id, other_id).await, 1);

    let (_, rejected) = ctx
        .send(Method::PATCH, &other_uri, Some(&admin), Some(json!({ "action": "reject" })))
        .await;
    assert_eq!(rejected["status"], "REJECTED");
    let (status, undone) = ctx
        .send(Method::PATCH, &other_uri, Some(&admin), Some(json!({ "action": "undo" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(undone["status"], "PENDING");
    assert_eq!(manager_notices(&ctx, task_id, other_id).await, 2);

    let (status, withdrawn) = ctx
        .send(Method::PATCH, &action_uri, Some(&volunteer), Some(json!({ "action": "withdraw" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(withdrawn["status"], "WITHDRAWN");
}

#[tokio::test]
#[ignore = "requires Postgres and Redis"]
async fn test_membership_rules() {
    let Some(ctx) = TestContext::new().await else {
        return;
    };
    let admin = ctx.user("Avery Stone").await;
    let member = ctx.user("Jordan Lee").await;
    let charity_id = onboard_charity(&ctx, &admin).await;

    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/memberships",
            Some(&admin),
            Some(json!({ "action": "leave", "charity_id": charity_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, joined) = ctx
        .send(
            Method::POST,
            "/v1/memberships",
            Some(&member),
            Some(json!({ "action": "join", "charity_id": charity_id, "roles": ["volunteer"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["membership"]["roles"], json!(["volunteer"]));

    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/memberships",
            Some(&member),
            Some(json!({ "action": "join", "charity_id": charity_id, "roles": ["admin"] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Members cannot manage other members
    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/memberships",
            Some(&member),
            Some(json!({ "action": "removeMember", "user_id": admin.id, "charity_id": charity_id })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Non-admins are refused before the member id is looked up
    let member_id = joined["membership"]["id"].as_str().unwrap().to_string();
    for target in [member_id.clone(), Uuid::new_v4().to_string()] {
        let (status, _) = ctx
            .send(
                Method::POST,
                "/v1/memberships",
                Some(&member),
                Some(json!({ "action": "updateMember", "member_id": target, "roles": ["coordinator"] })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/memberships",
            Some(&admin),
            Some(json!({ "action": "updateMember", "member_id": Uuid::new_v4(), "roles": ["coordinator"] })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, promoted) = ctx
        .send(
            Method::POST,
            "/v1/memberships",
            Some(&admin),
            Some(json!({ "action": "updateMember", "member_id": member_id, "roles": ["coordinator"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["membership"]["roles"], json!(["coordinator"]));

    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/memberships",
            Some(&admin),
            Some(json!({ "action": "removeMember", "user_id": admin.id, "charity_id": charity_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .send(
            Method::POST,
            "/v1/memberships",
            Some(&admin),
            Some(json!({ "action": "removeMember", "user_id": member.id, "charity_id": charity_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, members) = ctx
        .send(Method::GET, &format!("/v1/charities/{charity_id}/members"), Some(&admin), None)
        .await;
    assert_eq!(members.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
#[ignore = "requires Postgres and Redis"]
async fn test_comment_thread() {
    let Some(ctx) = TestContext::new().await else {
        return;
    };
    let admin = ctx.user("Avery Stone").await;
    let volunteer = ctx.user("Jordan Lee").await;
    let charity_id = onboard_charity(&ctx, &admin).await;
    let task = create_task(&ctx, &admin, &charity_id, 2).await;
    let task_id = task["id"].as_str().unwrap();
    let uri = format!("/v1/tasks/{task_id}/comments");

    let (status, root) = ctx
        .send(Method::POST, &uri, Some(&volunteer), Some(json!({ "content": "When is the deadline?" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let root_id = root["id"].as_str().unwrap().to_string();

    let (status, _) = ctx
        .send(
            Method::POST,
            &uri,
            Some(&admin),
            Some(json!({ "content": "In two weeks", "parent_id": root_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = ctx
        .send(Method::POST, &uri, Some(&volunteer), Some(json!({ "content": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, tree) = ctx.send(Method::GET, &uri, Some(&volunteer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree[0]["author"]["name"], "Jordan Lee");
    assert_eq!(tree[0]["replies"][0]["content"], "In two weeks");

    let (status, _) = ctx
        .send(Method::DELETE, &format!("/v1/comments/{root_id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .send(Method::DELETE, &format!("/v1/comments/{root_id}"), Some(&volunteer), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, tree) = ctx.send(Method::GET, &uri, Some(&volunteer), None).await;
    assert_eq!(tree, json!([]));
}
