/// Application state and router
///
/// # Example
///
/// ```no_run
/// use altruvist_api::{app::{build_router, AppState}, config::Config};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::connect(config).await?;
/// let app = build_router(state);
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, middleware::security::SecurityHeadersLayer, routes};
use altruvist_shared::{
    auth::{middleware::create_jwt_middleware, oidc::OidcClient},
    db::pool::{create_pool, DatabaseConfig},
    integrations::{notifications::NovuClient, search::SearchClient, storage::StorageClient},
    redis::{RedisClient, RedisConfig},
};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub redis: RedisClient,
    pub oidc: OidcClient,
    pub search: Arc<SearchClient>,
    pub notifications: NovuClient,
    pub storage: Arc<StorageClient>,
}

impl AppState {
    /// Connects to Postgres and Redis and builds the third-party clients
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let db = create_pool(DatabaseConfig {
            url: config.database.url.clone(),
            max_connections: config.database.max_connections,
            ..Default::default()
        })
        .await?;

        let redis = RedisClient::new(RedisConfig {
            url: config.redis_url.clone(),
            ..Default::default()
        })
        .await?;

        Self::new(db, redis, config)
    }

    pub fn new(db: PgPool, redis: RedisClient, config: Config) -> anyhow::Result<Self> {
        let search = SearchClient::new(&config.search.host, config.search.api_key.as_deref())?;
        let storage = StorageClient::new(config.storage.clone())?;
        let notifications =
            NovuClient::new(&config.notifications.api_url, &config.notifications.api_key);
        let oidc = OidcClient::new(config.oidc.clone());

        Ok(Self {
            db,
            config: Arc::new(config),
            redis,
            oidc,
            search: Arc::new(search),
            notifications,
            storage: Arc::new(storage),
        })
    }

    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the router
///
/// ```text
/// /health                      public
/// /v1/auth/*                   public (OIDC login, refresh, logout)
/// /v1/*                        Bearer access token + per-user rate limit
/// ```
pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login", get(routes::auth::login))
        .route("/callback", get(routes::auth::callback))
        .route("/refresh", post(routes::auth::refresh))
        .route("/logout", get(routes::auth::logout));

    let protected = Router::new()
        .route(
            "/users/me",
            get(routes::users::me)
                .patch(routes::users::update_me)
                .delete(routes::users::delete_me),
        )
        .route("/users/me/onboarding", post(routes::users::onboarding))
        .route("/users/:id", get(routes::users::get_user))
        .route(
            "/charities",
            post(routes::charities::create_charity).get(routes::charities::list_charities),
        )
        .route(
            "/charities/:id",
            get(routes::charities::get_charity)
                .patch(routes::charities::update_charity)
                .delete(routes::charities::delete_charity),
        )
        .route("/charities/:id/members", get(routes::charities::list_members))
        .route("/charities/:id/tasks", get(routes::charities::list_tasks))
        .route(
            "/charities/:id/applications",
            get(routes::charities::list_applications),
        )
        .route("/memberships", post(routes::memberships::membership_action))
        .route("/tasks", post(routes::tasks::create_task))
        .route("/tasks/explore", get(routes::tasks::explore))
        .route("/tasks/mine", get(routes::tasks::my_tasks))
        .route(
            "/tasks/:id",
            get(routes::tasks::get_task)
                .patch(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route(
            "/tasks/:id/applications",
            post(routes::applications::apply).get(routes::applications::list_for_task),
        )
        .route(
            "/applications/:id",
            patch(routes::applications::application_action)
                .delete(routes::applications::delete_application),
        )
        .route(
            "/tasks/:id/comments",
            get(routes::comments::list_comments).post(routes::comments::create_comment),
        )
        .route(
            "/comments/:id",
            patch(routes::comments::edit_comment).delete(routes::comments::delete_comment),
        )
        .route("/search", get(routes::search::search))
        .route("/notifications", get(routes::notifications::list))
        .route("/notifications/read-all", post(routes::notifications::mark_all_read))
        .route("/notifications/:id/read", post(routes::notifications::mark_read))
        .route(
            "/notifications/:id",
            axum::routing::delete(routes::notifications::delete),
        )
        .route("/uploads/signed-url", get(routes::uploads::signed_url))
        .route("/uploads", axum::routing::delete(routes::uploads::delete_object))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit::rate_limit_layer,
        ))
        .route_layer(axum::middleware::from_fn(create_jwt_middleware(
            state.jwt_secret().to_string(),
        )));

    let v1_routes = Router::new().nest("/auth", auth_routes).merge(protected);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_permissive() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
