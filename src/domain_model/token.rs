use super::{RefreshHash, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Identifier of a single access token; the key of the freshness cache.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize)]
pub struct AccessTokenId(pub String);

impl AccessTokenId {
    pub fn generate() -> Self {
        AccessTokenId(nanoid::nanoid!())
    }
}

impl fmt::Display for AccessTokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AccessClaims {
    pub user_id: UserId,
    pub token_id: AccessTokenId,
    pub bound_refresh_id: RefreshHash,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RefreshClaims {
    pub user_id: UserId,
    pub token_id: String,
    pub session_id: SessionId,
}
