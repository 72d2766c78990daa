use crate::domain_model::{AccessTokenId, SessionId};
use crate::domain_port::*;
use crate::infra_common::within_deadline;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

const FRESH_ACCESS_TOKENS: &str = "fresh-access-tokens";

/// Freshness index kept in one sorted set: member = access token id,
/// score = expiry in epoch milliseconds.
///
/// Each session also gets `<prefix>:session:<sid>`, a sorted set of the
/// access ids it minted. It expires with its last access token.
pub struct RedisFreshnessCache {
    conn: ConnectionManager,
    prefix: String,
    key: String,
    deadline: Duration,
}

impl RedisFreshnessCache {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>, deadline: Duration) -> Self {
        let prefix = prefix.into();
        RedisFreshnessCache {
            conn,
            key: format!("{}:{}", prefix, FRESH_ACCESS_TOKENS),
            prefix,
            deadline,
        }
    }

    fn session_key(&self, session_id: SessionId) -> String {
        format!("{}:session:{}", self.prefix, session_id)
    }
}

#[async_trait::async_trait]
impl FreshnessCache for RedisFreshnessCache {
    async fn mark(
        &self,
        token_id: &AccessTokenId,
        session_id: SessionId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let expires_ms = expires_at.timestamp_millis();
        let session_key = self.session_key(session_id);
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zadd(&self.key, &token_id.0, expires_ms)
            .ignore()
            .zadd(&session_key, &token_id.0, expires_ms)
            .ignore()
            .pexpire_at(&session_key, expires_ms)
            .ignore();
        let _: () = within_deadline(self.deadline, pipe.query_async(&mut conn))
            .await
            .map_err(CacheError::Store)?;
        Ok(())
    }

    async fn is_fresh(&self, token_id: &AccessTokenId) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let score: Option<f64> =
            within_deadline(self.deadline, conn.zscore(&self.key, &token_id.0))
                .await
                .map_err(CacheError::Store)?;

        let now_ms = Utc::now().timestamp_millis() as f64;
        Ok(score.is_some_and(|expires_ms| expires_ms > now_ms))
    }

    async fn revoke(&self, token_id: &AccessTokenId) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = within_deadline(self.deadline, conn.zrem(&self.key, &token_id.0))
            .await
            .map_err(CacheError::Store)?;
        Ok(())
    }

    async fn revoke_session(&self, session_id: SessionId) -> Result<u64, CacheError> {
        let session_key = self.session_key(session_id);
        let mut conn = self.conn.clone();

        let token_ids: Vec<String> =
            within_deadline(self.deadline, conn.zrange(&session_key, 0, -1))
                .await
                .map_err(CacheError::Store)?;
        if token_ids.is_empty() {
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(&self.key, &token_ids)
            .del(&session_key)
            .ignore();
        let (removed,): (u64,) = within_deadline(self.deadline, pipe.query_async(&mut conn))
            .await
            .map_err(CacheError::Store)?;
        Ok(removed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let removed: u64 = within_deadline(
            self.deadline,
            conn.zrembyscore(&self.key, "-inf", now.timestamp_millis()),
        )
        .await
        .map_err(CacheError::Store)?;
        Ok(removed)
    }
}
