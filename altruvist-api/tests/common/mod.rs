/// Shared setup for API integration tests
///
/// A [`TestContext`] needs Postgres (`DATABASE_URL`) and Redis (`REDIS_URL`).
/// [`TestContext::new`] returns `None` when either is unset so callers can
/// skip. Third-party services are never contacted: search, notification and
/// storage writes only land in the outbox.

use altruvist_api::app::{build_router, AppState};
use altruvist_api::config::{
    ApiConfig, Config, DatabaseConfig, JwtConfig, NotificationsConfig, SearchConfig,
};
use altruvist_shared::auth::jwt::{create_token, Claims, TokenType};
use altruvist_shared::auth::oidc::OidcConfig;
use altruvist_shared::db::migrations::run_migrations;
use altruvist_shared::integrations::storage::StorageConfig;
use altruvist_shared::models::user::{CreateUser, User};
use altruvist_shared::redis::{RedisClient, RedisConfig};
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

const JWT_SECRET: &str = "integration-test-secret-at-least-32-bytes";

pub struct TestContext {
    pub db: PgPool,
    pub app: axum::Router,
    pub config: Config,
}

fn test_config(database_url: String, redis_url: String) -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            production: false,
            rate_limit_per_minute: 1000,
        },
        database: DatabaseConfig {
            url: database_url,
            max_connections: 5,
        },
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
        },
        redis_url,
        oidc: OidcConfig {
            domain: "https://login.altruvist.test".to_string(),
            client_id: "altruvist-test".to_string(),
            redirect_uri: "http://localhost:8080/v1/auth/callback".to_string(),
            logout_redirect_uri: "http://localhost:5173/".to_string(),
        },
        search: SearchConfig {
            host: "http://localhost:7700".to_string(),
            api_key: None,
        },
        notifications: NotificationsConfig {
            api_url: "http://localhost:3000".to_string(),
            api_key: String::new(),
        },
        storage: StorageConfig::default(),
    }
}

impl TestContext {
    pub async fn new() -> Option<Self> {
        let database_url = std::env::var("DATABASE_URL").ok()?;
        let redis_url = std::env::var("REDIS_URL").ok()?;
        let config = test_config(database_url, redis_url);

        let db = PgPool::connect(&config.database.url)
            .await
            .expect("Failed to connect to Postgres");
        run_migrations(&db).await.expect("Failed to run migrations");

        let redis = RedisClient::new(RedisConfig {
            url: config.redis_url.clone(),
            ..Default::default()
        })
        .await
        .expect("Failed to connect to Redis");

        let state = AppState::new(db.clone(), redis, config.clone()).expect("Failed to build state");
        let app = build_router(state);

        Some(Self { db, app, config })
    }

    /// Creates a user that has not onboarded yet
    pub async fn user(&self, name: &str) -> User {
        let suffix = Uuid::new_v4();
        let (user, _) = User::upsert_from_identity(
            &self.db,
            CreateUser {
                zitadel_id: format!("zitadel-{suffix}"),
                email: format!("{suffix}@example.org"),
                name: name.to_string(),
                locale: None,
            },
        )
        .await
        .expect("Failed to create user");
        user
    }

    pub fn token(&self, user: &User) -> String {
        create_token(&Claims::new(user.id, TokenType::Access), &self.config.jwt.secret)
            .expect("Failed to create token")
    }

    /// Sends a request and returns the status with the parsed JSON body
    /// (`Value::Null` for empty bodies).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        user: Option<&User>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    /// Outbox jobs of `kind` whose payload field `field` equals `value`
    pub async fn outbox_count(&self, kind: &str, field: &str, value: &str) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM outbox_jobs WHERE kind = $1 AND payload ->> $2 = $3",
        )
        .bind(kind)
        .bind(field)
        .bind(value)
        .fetch_one(&self.db)
        .await
        .expect("Failed to count outbox jobs")
    }
}
