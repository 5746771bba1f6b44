//! # Altruvist Shared Library
//!
//! Types and business logic shared by the Altruvist API server and the outbox
//! worker.
//!
//! ## Module Organization
//!
//! - `models`: database models and queries
//! - `db`: connection pool and migrations
//! - `auth`: OIDC login, session tokens, authorization checks
//! - `filtering`: dashboard task filtering
//! - `integrations`: Meilisearch, Novu and S3 clients
//! - `redis`: Redis client for login state and rate limiting

pub mod auth;
pub mod db;
pub mod filtering;
pub mod integrations;
pub mod models;
pub mod redis;

/// Current version of the Altruvist shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
