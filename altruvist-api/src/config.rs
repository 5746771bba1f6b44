/// Configuration for the API server
///
/// Loaded from environment variables (a `.env` file is read in development).
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: bind address (default `0.0.0.0:8080`)
/// - `CORS_ORIGINS`: comma-separated origins, `*` for permissive (default `*`)
/// - `PRODUCTION`: enables HSTS (default `false`)
/// - `RATE_LIMIT_PER_MINUTE`: per-user request budget (default 120)
/// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`
/// - `JWT_SECRET`: at least 32 characters (required)
/// - `REDIS_URL` (required)
/// - `ZITADEL_DOMAIN`, `ZITADEL_CLIENT_ID`, `ZITADEL_REDIRECT_URI`,
///   `ZITADEL_LOGOUT_REDIRECT_URI`
/// - `MEILI_HOST`, `MEILI_API_KEY`
/// - `NOVU_API_KEY`, `NOVU_API_URL`
/// - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `S3_REGION`, `S3_BUCKET`

use altruvist_shared::auth::oidc::OidcConfig;
use altruvist_shared::integrations::notifications::DEFAULT_API_URL;
use altruvist_shared::integrations::storage::{StorageConfig, DEFAULT_BUCKET, DEFAULT_REGION};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub redis_url: String,
    pub oidc: OidcConfig,
    pub search: SearchConfig,
    pub notifications: NotificationsConfig,
    #[serde(skip)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,

    /// Adds `Strict-Transport-Security`
    pub production: bool,

    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HS256 signing key. Generate with: `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub host: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).map_err(|_| anyhow::anyhow!("{name} environment variable is required"))
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// # Errors
    ///
    /// Fails when a required variable is missing, a number does not parse,
    /// or `JWT_SECRET` is shorter than 32 characters.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        Ok(Self {
            api: ApiConfig {
                host: var_or("API_HOST", "0.0.0.0"),
                port: var_or("API_PORT", "8080").parse()?,
                cors_origins: parse_origins(&var_or("CORS_ORIGINS", "*")),
                production: var_or("PRODUCTION", "false").parse()?,
                rate_limit_per_minute: var_or("RATE_LIMIT_PER_MINUTE", "120").parse()?,
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: var_or("DATABASE_MAX_CONNECTIONS", "10").parse()?,
            },
            jwt: JwtConfig { secret: jwt_secret },
            redis_url: required("REDIS_URL")?,
            oidc: OidcConfig {
                domain: required("ZITADEL_DOMAIN")?,
                client_id: required("ZITADEL_CLIENT_ID")?,
                redirect_uri: required("ZITADEL_REDIRECT_URI")?,
                logout_redirect_uri: required("ZITADEL_LOGOUT_REDIRECT_URI")?,
            },
            search: SearchConfig {
                host: var_or("MEILI_HOST", "http://localhost:7700"),
                api_key: env::var("MEILI_API_KEY").ok(),
            },
            notifications: NotificationsConfig {
                api_url: var_or("NOVU_API_URL", DEFAULT_API_URL),
                api_key: var_or("NOVU_API_KEY", ""),
            },
            storage: StorageConfig {
                region: var_or("S3_REGION", DEFAULT_REGION),
                bucket: var_or("S3_BUCKET", DEFAULT_BUCKET),
                access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn cors_permissive(&self) -> bool {
        self.api.cors_origins.iter().any(|o| o == "*")
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            production: false,
            rate_limit_per_minute: 120,
        },
        database: DatabaseConfig {
            url: "postgresql://localhost/altruvist_test".to_string(),
            max_connections: 5,
        },
        jwt: JwtConfig {
            secret: "test-secret-key-at-least-32-bytes-long".to_string(),
        },
        redis_url: "redis://localhost:6379".to_string(),
        oidc: OidcConfig {
            domain: "https://login.altruvist.test".to_string(),
            client_id: "client".to_string(),
            redirect_uri: "http://localhost:8080/v1/auth/callback".to_string(),
            logout_redirect_uri: "http://localhost:5173/".to_string(),
        },
        search: SearchConfig {
            host: "http://localhost:7700".to_string(),
            api_key: None,
        },
        notifications: NotificationsConfig {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
        },
        storage: StorageConfig::default(),
    }
}
