use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Refresh token is malformed")]
    MalformedRefreshToken,
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
    #[error("Access token is malformed")]
    MalformedAccessToken,
    #[error("Invalid access token")]
    InvalidAccessToken,
    #[error("Access token expired")]
    AccessTokenExpired,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Stable numeric code reported to clients.
    pub fn code(&self) -> u16 {
        match self {
            AuthError::MalformedRefreshToken => 301,
            AuthError::InvalidRefreshToken => 302,
            AuthError::MalformedAccessToken => 304,
            AuthError::InvalidAccessToken => 305,
            AuthError::AccessTokenExpired => 306,
            AuthError::Store(_) | AuthError::InternalError(_) => 101,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IssueResult {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub tokens: AuthTokens,
    /// Sessions dropped to stay within the per-user limit, oldest first.
    pub evicted: Vec<SessionId>,
}

/// Signs and verifies claim sets with a single shared secret.
pub trait TokenCodec: Send + Sync {
    fn sign_access(&self, claims: &AccessClaims) -> Result<AccessToken, AuthError>;

    /// Checks signature, shape and the `exp` claim.
    fn verify_access(&self, token: &AccessToken) -> Result<AccessClaims, AuthError>;

    /// Like `verify_access` but accepts an elapsed `exp`.
    fn verify_access_ignoring_expiry(&self, token: &AccessToken)
    -> Result<AccessClaims, AuthError>;

    fn sign_refresh(&self, claims: &RefreshClaims) -> Result<RefreshToken, AuthError>;

    fn verify_refresh(&self, token: &RefreshToken) -> Result<RefreshClaims, AuthError>;
}

#[async_trait::async_trait]
pub trait TokenService: Send + Sync {
    /// Opens a new session for an already-authenticated user.
    async fn issue(&self, user_id: UserId) -> Result<IssueResult, AuthError>;

    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<AuthTokens, AuthError>;

    async fn validate_access_token(&self, token: &AccessToken) -> Result<AccessClaims, AuthError>;

    /// Logout: deletes the session the (current) refresh token belongs to.
    async fn revoke(&self, refresh_token: &RefreshToken) -> Result<(), AuthError>;

    async fn revoke_access_token(&self, token: &AccessToken) -> Result<(), AuthError>;
}
