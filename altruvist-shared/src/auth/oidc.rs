/// Zitadel login using the authorization-code flow with PKCE
///
/// # Flow
///
/// 1. `/v1/auth/login` generates a [`PkceChallenge`] and a random state, stores
///    the verifier in Redis under `oidc:state:{state}` and returns
///    [`OidcClient::authorize_url`].
/// 2. Zitadel redirects back to `/v1/auth/callback?code&state`. The verifier is
///    taken from Redis (a state can be used once) and the code is exchanged.
/// 3. The access token from Zitadel is used once to read the userinfo claims.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use crate::redis::{RedisClient, RedisClientError};

pub const SCOPES: &str = "openid email profile";

/// How long a login may take between redirect and callback
pub const STATE_TTL_SECS: u64 = 600;

#[derive(Debug, Error)]
pub enum OidcError {
    #[error("Invalid OIDC configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown or expired login state")]
    InvalidState,

    #[error("Identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Identity provider rejected the request: HTTP {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Login state storage failed: {0}")]
    Storage(#[from] RedisClientError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// Issuer base, e.g. `https://altruvist.zitadel.cloud`
    pub domain: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub logout_redirect_uri: String,
}

/// PKCE verifier and its S256 challenge
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

/// Opaque value tying a callback to the login that started it
pub fn generate_state() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn state_key(state: &str) -> String {
    format!("oidc:state:{state}")
}

/// Remembers the verifier for `state` until the callback arrives
pub async fn store_pkce(
    redis: &RedisClient,
    state: &str,
    verifier: &str,
) -> Result<(), OidcError> {
    redis
        .set_with_ttl(&state_key(state), verifier, STATE_TTL_SECS)
        .await?;
    Ok(())
}

/// Consumes the verifier for `state`
pub async fn take_pkce(redis: &RedisClient, state: &str) -> Result<String, OidcError> {
    redis
        .take(&state_key(state))
        .await?
        .ok_or(OidcError::InvalidState)
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub token_type: String,
}

/// Claims read from the userinfo endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

impl UserInfo {
    /// Display name, falling back to the email's local part
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[derive(Clone)]
pub struct OidcClient {
    http: reqwest::Client,
    config: OidcConfig,
}

impl OidcClient {
    pub fn new(config: OidcConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> Result<Url, OidcError> {
        let base = self.config.domain.trim_end_matches('/');
        Url::parse(&format!("{base}{path}")).map_err(|e| OidcError::InvalidConfig(e.to_string()))
    }

    pub fn authorize_url(&self, state: &str, challenge: &PkceChallenge) -> Result<String, OidcError> {
        let mut url = self.endpoint("/oauth/v2/authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPES)
            .append_pair("state", state)
            .append_pair("code_challenge", &challenge.challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse, OidcError> {
        let url = self.endpoint("/oauth/v2/token")?;
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", verifier),
        ];

        let resp = self.http.post(url).form(&params).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            tracing::warn!(status, "Authorization code exchange failed");
            return Err(OidcError::Provider { status, message });
        }
        Ok(resp.json().await?)
    }

    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo, OidcError> {
        let url = self.endpoint("/oidc/v1/userinfo")?;
        let resp = self.http.get(url).bearer_auth(access_token).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(OidcError::Provider { status, message });
        }
        Ok(resp.json().await?)
    }

    /// RP-initiated logout URL
    pub fn end_session_url(&self, id_token_hint: Option<&str>, state: &str) -> Result<String, OidcError> {
        let mut url = self.endpoint("/oidc/v1/end_session")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(hint) = id_token_hint {
                pairs.append_pair("id_token_hint", hint);
            }
            pairs
                .append_pair("client_id", &self.config.client_id)
                .append_pair("post_logout_redirect_uri", &self.config.logout_redirect_uri)
                .append_pair("state", state);
        }
        Ok(url.into())
    }
}
