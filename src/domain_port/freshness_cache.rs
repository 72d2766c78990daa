use crate::domain_model::{AccessTokenId, SessionId};
use chrono::{DateTime, Utc};

/// Ephemeral index of access tokens that have not been revoked, scored by
/// expiry. An entry whose score has elapsed is treated as absent.
///
/// Entries are also indexed by the session that minted them so a deleted
/// session can take all of its access tokens down at once.
#[async_trait::async_trait]
pub trait FreshnessCache: Send + Sync {
    async fn mark(
        &self,
        token_id: &AccessTokenId,
        session_id: SessionId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CacheError>;

    async fn is_fresh(&self, token_id: &AccessTokenId) -> Result<bool, CacheError>;

    async fn revoke(&self, token_id: &AccessTokenId) -> Result<(), CacheError>;

    /// Revokes every access token marked for `session_id`. Returns how many
    /// were still indexed.
    async fn revoke_session(&self, session_id: SessionId) -> Result<u64, CacheError>;

    /// Drops every entry scored at or before `now`. Returns how many went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CacheError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("freshness store error: {0}")]
    Store(String),
}
