/// Authentication and authorization
///
/// # Modules
///
/// - [`oidc`]: Zitadel login (authorization code + PKCE)
/// - [`jwt`]: session tokens issued after login
/// - [`middleware`]: Bearer token extraction for axum
/// - [`authorization`]: charity role and task ownership checks
///
/// # Example
///
/// ```no_run
/// use altruvist_shared::auth::jwt::issue_token_pair;
/// use altruvist_shared::auth::oidc::{generate_state, PkceChallenge};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pkce = PkceChallenge::generate();
/// let state = generate_state();
///
/// let tokens = issue_token_pair(Uuid::new_v4(), "a-signing-secret-of-at-least-32-bytes")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod oidc;
