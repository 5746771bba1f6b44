/// Database-backed model tests
///
/// Each test creates its own users, charity and tasks with random ids, so the
/// suite can run against a shared database. Tests return early when
/// `DATABASE_URL` is unset.

use altruvist_shared::db::migrations::run_migrations;
use altruvist_shared::db::pool::{create_pool, DatabaseConfig};
use altruvist_shared::integrations::notifications::topics;
use altruvist_shared::models::charity::{Charity, CreateCharity};
use altruvist_shared::models::charity_application::{
    ApplicationReviewError, CharityApplication, CharityApplicationStatus, CreateCharityApplication,
};
use altruvist_shared::models::comment::{build_comment_tree, Comment, CommentError};
use altruvist_shared::models::membership::{CharityMembership, CreateMembership};
use altruvist_shared::models::outbox::{JobPayload, OutboxJob, OutboxStatus};
use altruvist_shared::models::membership::CharityRole;
use altruvist_shared::models::task::{
    CreateTask, ExploreQuery, LocationType, SortDirection, Task, TaskLocation, UpdateTask,
    UserTasksQuery,
};
use altruvist_shared::models::task_application::{
    ApplicationStatus, CreateTaskApplication, TaskApplication, TaskApplicationError,
};
use altruvist_shared::models::user::{CreateUser, User, UserRole};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

async fn setup() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = create_pool(DatabaseConfig {
        url,
        max_connections: 5,
        ..Default::default()
    })
    .await
    .expect("Failed to create pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    Some(pool)
}

async fn user(pool: &PgPool, name: &str) -> User {
    let suffix = Uuid::new_v4();
    let (user, created) = User::upsert_from_identity(
        pool,
        CreateUser {
            zitadel_id: format!("zitadel-{suffix}"),
            email: format!("{suffix}@example.org"),
            name: name.to_string(),
            locale: None,
        },
    )
    .await
    .unwrap();
    assert!(created);
    user
}

async fn charity(pool: &PgPool, admin: &User) -> Charity {
    let mut tx = pool.begin().await.unwrap();
    let charity = Charity::create(
        &mut *tx,
        CreateCharity {
            name: "River Cleanup".to_string(),
            description: "Keeping the riverbanks clean".to_string(),
            website: None,
            contact_email: None,
            tags: vec!["Environment".to_string()],
            background_picture: None,
        },
        admin.id,
    )
    .await
    .unwrap();
    CharityMembership::create(
        &mut *tx,
        CreateMembership {
            user_id: admin.id,
            charity_id: charity.id,
            roles: vec!["admin".to_string()],
            permissions: Vec::new(),
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    charity
}

fn new_task(charity: &Charity, volunteers_needed: i32) -> CreateTask {
    CreateTask {
        title: "Design a flyer".to_string(),
        description: "A flyer for the spring cleanup".to_string(),
        impact: "More volunteers on the day".to_string(),
        charity_id: charity.id,
        required_skills: vec!["Design".to_string()],
        category: vec!["Environment".to_string()],
        urgency: None,
        volunteers_needed,
        deliverables: vec!["PDF flyer".to_string()],
        deadline: Utc::now() + Duration::days(14),
        location: None,
        resources: Vec::new(),
        reward_amount: None,
        creator_wallet_address: None,
    }
}

async fn task(pool: &PgPool, charity: &Charity, creator: &User, volunteers_needed: i32) -> Task {
    Task::create(pool, new_task(charity, volunteers_needed), creator.id)
        .await
        .unwrap()
}

fn town_hall() -> TaskLocation {
    TaskLocation {
        address: "1 Market Square".to_string(),
        lat: 51.5,
        lng: -0.12,
    }
}

async fn apply(pool: &PgPool, task: &Task, volunteer: &User) -> TaskApplication {
    TaskApplication::apply(
        pool,
        CreateTaskApplication {
            task_id: task.id,
            user_id: volunteer.id,
            charity_id: task.charity_id,
            message: None,
            volunteer_wallet_address: None,
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_upsert_returns_existing_user() {
    let Some(pool) = setup().await else { return };
    let first = user(&pool, "Ada Lovelace").await;

    let (again, created) = User::upsert_from_identity(
        &pool,
        CreateUser {
            zitadel_id: first.zitadel_id.clone(),
            email: "other@example.org".to_string(),
            name: "Someone Else".to_string(),
            locale: None,
        },
    )
    .await
    .unwrap();

    assert!(!created);
    assert_eq!(again.id, first.id);
    assert_eq!(again.email, first.email);
}

#[tokio::test]
async fn test_charity_topics_and_membership_merge() {
    let Some(pool) = setup().await else { return };
    let admin = user(&pool, "Grace Hopper").await;
    let charity = charity(&pool, &admin).await;

    assert_eq!(
        charity.notify_topic_ids,
        vec![topics::charity_admins(charity.id), topics::charity_coordinators(charity.id)]
    );

    let merged = CharityMembership::create(
        &pool,
        CreateMembership {
            user_id: admin.id,
            charity_id: charity.id,
            roles: vec!["coordinator".to_string(), "admin".to_string()],
            permissions: Vec::new(),
        },
    )
    .await
    .unwrap();
    let mut roles = merged.roles.clone();
    roles.sort();
    assert_eq!(roles, vec!["admin", "coordinator"]);
    assert_eq!(CharityMembership::count_admins(&pool, charity.id).await.unwrap(), 1);

    let topics = vec!["custom:topic".to_string()];
    assert!(Charity::set_notify_topics(&pool, charity.id, topics.clone()).await.unwrap());
    let reloaded = Charity::find_by_id(&pool, charity.id).await.unwrap().unwrap();
    assert_eq!(reloaded.notify_topic_ids, topics);
    assert!(!Charity::set_notify_topics(&pool, Uuid::new_v4(), Vec::new()).await.unwrap());
}

#[tokio::test]
async fn test_charity_application_review_once() {
    let Some(pool) = setup().await else { return };
    let admin = user(&pool, "Grace Hopper").await;
    let applicant = user(&pool, "Alan Turing").await;
    let charity = charity(&pool, &admin).await;

    let application = CharityApplication::create(
        &pool,
        CreateCharityApplication {
            user_id: applicant.id,
            charity_id: charity.id,
            roles: vec!["volunteer".to_string()],
            application_note: Some("Happy to help".to_string()),
        },
    )
    .await
    .unwrap();

    let outcome = CharityApplication::review(
        &pool,
        application.id,
        admin.id,
        CharityApplicationStatus::Accepted,
        None,
    )
    .await
    .unwrap();
    assert_eq!(outcome.application.status, CharityApplicationStatus::Accepted);
    assert_eq!(outcome.membership.unwrap().roles, vec!["volunteer"]);

    let second = CharityApplication::review(
        &pool,
        application.id,
        admin.id,
        CharityApplicationStatus::Rejected,
        None,
    )
    .await;
    assert!(matches!(second, Err(ApplicationReviewError::AlreadyReviewed)));
}

#[tokio::test]
async fn test_task_application_limits() {
    let Some(pool) = setup().await else { return };
    let admin = user(&pool, "Grace Hopper").await;
    let first = user(&pool, "Volunteer One").await;
    let second = user(&pool, "Volunteer Two").await;
    let charity = charity(&pool, &admin).await;
    let task = task(&pool, &charity, &admin, 1).await;

    let a = apply(&pool, &task, &first).await;
    let b = apply(&pool, &task, &second).await;
    assert!(a.is_pending());

    let duplicate = TaskApplication::apply(
        &pool,
        CreateTaskApplication {
            task_id: task.id,
            user_id: first.id,
            charity_id: task.charity_id,
            message: None,
            volunteer_wallet_address: None,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(TaskApplicationError::AlreadyApplied)));

    TaskApplication::update_status(&pool, a.id, ApplicationStatus::Accepted)
        .await
        .unwrap();
    // Re-accepting does not count itself against the limit
    TaskApplication::update_status(&pool, a.id, ApplicationStatus::Accepted)
        .await
        .unwrap();

    let full = TaskApplication::update_status(&pool, b.id, ApplicationStatus::Accepted).await;
    assert!(matches!(full, Err(TaskApplicationError::NoSpotsRemaining)));
    assert_eq!(TaskApplication::count_accepted(&pool, task.id).await.unwrap(), 1);

    let rejected = TaskApplication::update_status(&pool, b.id, ApplicationStatus::Rejected)
        .await
        .unwrap();
    assert_eq!(rejected.status, ApplicationStatus::Rejected);

    let missing = TaskApplication::update_status(&pool, Uuid::new_v4(), ApplicationStatus::Accepted).await;
    assert!(matches!(missing, Err(TaskApplicationError::NotFound)));
}

#[tokio::test]
async fn test_tasks_for_volunteer_carry_own_application() {
    let Some(pool) = setup().await else { return };
    let admin = user(&pool, "Grace Hopper").await;
    let volunteer = user(&pool, "Volunteer One").await;
    let other = user(&pool, "Volunteer Two").await;
    let charity = charity(&pool, &admin).await;
    let task = task(&pool, &charity, &admin, 3).await;

    apply(&pool, &task, &volunteer).await;
    apply(&pool, &task, &other).await;

    let mine = Task::list_for_user(&pool, UserRole::Volunteer, volunteer.id, &UserTasksQuery::default())
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].task_applications.len(), 1);
    assert_eq!(mine[0].task_applications[0].user_id, volunteer.id);

    let managed = Task::list_for_user(&pool, UserRole::Charity, admin.id, &UserTasksQuery::default())
        .await
        .unwrap();
    let listed = managed.iter().find(|t| t.task.id == task.id).unwrap();
    assert_eq!(listed.task_applications.len(), 2);

    let bad_status = UserTasksQuery {
        status: Some("NOPE".to_string()),
        ..Default::default()
    };
    assert!(Task::list_for_user(&pool, UserRole::Volunteer, volunteer.id, &bad_status)
        .await
        .is_err());
}

#[tokio::test]
async fn test_explore_pages_do_not_overlap() {
    let Some(pool) = setup().await else { return };
    let admin = user(&pool, "Grace Hopper").await;
    let charity = charity(&pool, &admin).await;
    for _ in 0..3 {
        task(&pool, &charity, &admin, 1).await;
    }

    let first = Task::explore(
        &pool,
        &ExploreQuery {
            limit: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(first.tasks.len(), 2);
    let cursor = first.next_cursor.expect("full page has a cursor");

    let second = Task::explore(
        &pool,
        &ExploreQuery {
            limit: Some(2),
            cursor: Some(cursor),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    for t in &second.tasks {
        assert!(first.tasks.iter().all(|f| f.task.id != t.task.id));
    }

    let unknown = Task::explore(
        &pool,
        &ExploreQuery {
            cursor: Some(Uuid::new_v4()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(unknown.tasks.is_empty());
    assert!(unknown.next_cursor.is_none());
}

#[tokio::test]
async fn test_explore_filters() {
    let Some(pool) = setup().await else { return };
    let admin = user(&pool, "Grace Hopper").await;
    let charity = charity(&pool, &admin).await;
    let category = format!("Category-{}", Uuid::new_v4());
    let extra = format!("Category-{}", Uuid::new_v4());
    let skill = format!("Skill-{}", Uuid::new_v4());

    let remote = Task::create(
        &pool,
        CreateTask {
            category: vec![category.clone()],
            required_skills: vec![skill.clone(), "Design".to_string()],
            ..new_task(&charity, 1)
        },
        admin.id,
    )
    .await
    .unwrap();
    let onsite = Task::create(
        &pool,
        CreateTask {
            category: vec![category.clone(), extra.clone()],
            required_skills: vec!["Writing".to_string()],
            location: Some(town_hall()),
            ..new_task(&charity, 1)
        },
        admin.id,
    )
    .await
    .unwrap();

    let ids = |page: &altruvist_shared::models::task::ExplorePage| {
        let mut ids: Vec<Uuid> = page.tasks.iter().map(|t| t.task.id).collect();
        ids.sort();
        ids
    };
    let sorted = |mut v: Vec<Uuid>| {
        v.sort();
        v
    };

    let by_category = Task::explore(
        &pool,
        &ExploreQuery {
            category: vec![category.clone()],
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(ids(&by_category), sorted(vec![remote.id, onsite.id]));

    // Any shared category matches
    let overlap = Task::explore(
        &pool,
        &ExploreQuery {
            category: vec![extra.clone(), format!("Category-{}", Uuid::new_v4())],
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(ids(&overlap), vec![onsite.id]);

    let by_skill = Task::explore(
        &pool,
        &ExploreQuery {
            category: vec![category.clone()],
            skills: vec![skill.clone()],
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(ids(&by_skill), vec![remote.id]);

    let remote_only = Task::explore(
        &pool,
        &ExploreQuery {
            category: vec![category.clone()],
            location_type: Some(LocationType::Remote),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(ids(&remote_only), vec![remote.id]);

    let onsite_only = Task::explore(
        &pool,
        &ExploreQuery {
            category: vec![category],
            location_type: Some(LocationType::Onsite),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(ids(&onsite_only), vec![onsite.id]);
}

#[tokio::test]
async fn test_explore_deadline_order_across_pages() {
    let Some(pool) = setup().await else { return };
    let admin = user(&pool, "Grace Hopper").await;
    let charity = charity(&pool, &admin).await;
    let category = format!("Category-{}", Uuid::new_v4());

    let mut by_days = Vec::new();
    for days in [3, 1, 2] {
        let created = Task::create(
            &pool,
            CreateTask {
                category: vec![category.clone()],
                deadline: Utc::now() + Duration::days(days),
                ..new_task(&charity, 1)
            },
            admin.id,
        )
        .await
        .unwrap();
        by_days.push((days, created.id));
    }
    by_days.sort();
    let expected: Vec<Uuid> = by_days.into_iter().map(|(_, id)| id).collect();

    let query = ExploreQuery {
        limit: Some(2),
        category: vec![category],
        deadline: Some(SortDirection::Asc),
        ..Default::default()
    };
    let first = Task::explore(&pool, &query).await.unwrap();
    let first_ids: Vec<Uuid> = first.tasks.iter().map(|t| t.task.id).collect();
    assert_eq!(first_ids, expected[..2]);

    let second = Task::explore(
        &pool,
        &ExploreQuery {
            cursor: first.next_cursor,
            ..query
        },
    )
    .await
    .unwrap();
    let second_ids: Vec<Uuid> = second.tasks.iter().map(|t| t.task.id).collect();
    assert_eq!(second_ids, expected[2..]);
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
async fn test_update_without_location_makes_task_remote() {
    let Some(pool) = setup().await else { return };
    let admin = user(&pool, "Grace Hopper").await;
    let charity = charity(&pool, &admin).await;
    let onsite = Task::create(
        &pool,
        CreateTask {
            location: Some(town_hall()),
            ..new_task(&charity, 3)
        },
        admin.id,
    )
    .await
    .unwrap();
    assert_eq!(onsite.location.as_ref().map(|l| l.0.clone()), Some(town_hall()));

    let updated = Task::update(
        &pool,
        onsite.id,
        UpdateTask {
            title: Some("Design a poster".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();

    assert!(updated.location.is_none());
    assert_eq!(updated.title, "Design a poster");
    assert_eq!(updated.volunteers_needed, 3);
    assert_eq!(updated.description, onsite.description);

    assert!(Task::update(&pool, Uuid::new_v4(), UpdateTask::default())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_tasks_for_charity_member_by_role() {
    let Some(pool) = setup().await else { return };
    let admin = user(&pool, "Grace Hopper").await;
    let coordinator = user(&pool, "Katherine Johnson").await;
    let helper = user(&pool, "Volunteer One").await;
    let charity = charity(&pool, &admin).await;
    let first = task(&pool, &charity, &admin, 1).await;
    let second = task(&pool, &charity, &admin, 1).await;

    for (member, role) in [(&coordinator, CharityRole::Coordinator), (&helper, CharityRole::Volunteer)] {
        CharityMembership::create(
            &pool,
            CreateMembership {
                user_id: member.id,
                charity_id: charity.id,
                roles: vec![role.as_str().to_string()],
                permissions: Vec::new(),
            },
        )
        .await
        .unwrap();
    }

    let managed = Task::list_for_user(&pool, UserRole::Charity, coordinator.id, &UserTasksQuery::default())
        .await
        .unwrap();
    let mut ids: Vec<Uuid> = managed.iter().map(|t| t.task.id).collect();
    ids.sort();
    let mut expected = vec![first.id, second.id];
    expected.sort();
    assert_eq!(ids, expected);

    let limited = Task::list_for_user(
        &pool,
        UserRole::Charity,
        coordinator.id,
        &UserTasksQuery {
            take: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(limited.len(), 1);

    let completed = Task::list_for_user(
        &pool,
        UserRole::Charity,
        coordinator.id,
        &UserTasksQuery {
            status: Some("COMPLETED".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(completed.is_empty());

    // A volunteer membership does not grant the charity dashboard
    let none = Task::list_for_user(&pool, UserRole::Charity, helper.id, &UserTasksQuery::default())
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_comment_thread_delete_cascades() {
    let Some(pool) = setup().await else { return };
    let admin = user(&pool, "Grace Hopper").await;
    let volunteer = user(&pool, "Volunteer One").await;
    let charity = charity(&pool, &admin).await;
    let task = task(&pool, &charity, &admin, 1).await;
    let other_task = self::task(&pool, &charity, &admin, 1).await;

    let root = Comment::create(&pool, task.id, volunteer.id, "When is the deadline?")
        .await
        .unwrap();
    let reply = Comment::create_reply(&pool, task.id, admin.id, root.id, "Two weeks")
        .await
        .unwrap();
    Comment::create_reply(&pool, task.id, volunteer.id, reply.id, "Thanks!")
        .await
        .unwrap();
    Comment::create(&pool, task.id, admin.id, "Kickoff call on Monday")
        .await
        .unwrap();

    let wrong_task = Comment::create_reply(&pool, other_task.id, admin.id, root.id, "Hi").await;
    assert!(matches!(wrong_task, Err(CommentError::ParentTaskMismatch)));
    let empty = Comment::create(&pool, task.id, admin.id, "   ").await;
    assert!(matches!(empty, Err(CommentError::EmptyContent)));

    let tree = build_comment_tree(Comment::list_for_task_with_authors(&pool, task.id).await.unwrap());
    assert_eq!(tree.len(), 2);
    let thread = tree.iter().find(|n| n.comment.id == root.id).unwrap();
    assert_eq!(thread.len(), 3);

    assert_eq!(Comment::delete_with_descendants(&pool, root.id).await.unwrap(), 3);
    let remaining = Comment::list_for_task_with_authors(&pool, task.id).await.unwrap();
    assert_eq!(remaining.len(), 1);

    assert!(matches!(
        Comment::delete_with_descendants(&pool, root.id).await,
        Err(CommentError::NotFound)
    ));
}

#[tokio::test]
async fn test_outbox_enqueue() {
    let Some(pool) = setup().await else { return };

    let job = OutboxJob::enqueue(
        &pool,
        JobPayload::CreateTopic {
            key: format!("test:{}", Uuid::new_v4()),
            name: "Test".to_string(),
        },
    )
    .await
    .unwrap();

    assert_eq!(job.kind, "create_topic");
    assert_eq!(job.status, OutboxStatus::Pending);
    assert_eq!(job.attempts, 0);
}
