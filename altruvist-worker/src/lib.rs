//! # Altruvist Worker Library
//!
//! Performs the side effects the API records in the outbox: search indexing
//! and notification topics, subscribers and triggers.
//!
//! ## Modules
//!
//! - `config`: worker settings from the environment
//! - `queue`: claims outbox jobs and records outcomes
//! - `handlers`: job handlers for Meilisearch and Novu
//! - `dispatcher`: the polling loop that runs handlers concurrently

pub mod config;
pub mod dispatcher;
pub mod handlers;
pub mod queue;
