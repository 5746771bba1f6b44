//! # Altruvist API Server Library
//!
//! HTTP surface of the Altruvist volunteering marketplace.
//!
//! ## Modules
//!
//! - `app`: application state and router
//! - `config`: environment configuration
//! - `error`: error type and HTTP response mapping
//! - `jobs`: outbox job builders used by handlers
//! - `middleware`: security headers and rate limiting
//! - `routes`: route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod routes;
