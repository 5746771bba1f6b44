/// Database layer for Altruvist
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: embedded schema migrations
///
/// Models and their queries live in the `models` module at crate root.

pub mod migrations;
pub mod pool;
