use crate::domain_model::{AccessTokenId, SessionId};
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

pub struct MemoryFreshnessCache {
    entries: DashMap<String, DateTime<Utc>>,
    // may hold ids already revoked or purged; `entries` is authoritative
    by_session: DashMap<SessionId, Vec<String>>,
}

impl MemoryFreshnessCache {
    pub fn new() -> Self {
        MemoryFreshnessCache {
            entries: DashMap::new(),
            by_session: DashMap::new(),
        }
    }
}

impl Default for MemoryFreshnessCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FreshnessCache for MemoryFreshnessCache {
    async fn mark(
        &self,
        token_id: &AccessTokenId,
        session_id: SessionId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.entries.insert(token_id.0.clone(), expires_at);
        self.by_session
            .entry(session_id)
            .or_default()
            .push(token_id.0.clone());
        Ok(())
    }

    async fn is_fresh(&self, token_id: &AccessTokenId) -> Result<bool, CacheError> {
        let now = Utc::now();
        Ok(self
            .entries
            .get(&token_id.0)
            .is_some_and(|expires_at| *expires_at > now))
    }

    async fn revoke(&self, token_id: &AccessTokenId) -> Result<(), CacheError> {
        self.entries.remove(&token_id.0);
        Ok(())
    }

    async fn revoke_session(&self, session_id: SessionId) -> Result<u64, CacheError> {
        let Some((_, token_ids)) = self.by_session.remove(&session_id) else {
            return Ok(0);
        };
        let removed = token_ids
            .iter()
            .filter(|id| self.entries.remove(id.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CacheError> {
        let mut removed = 0;
        self.entries.retain(|_, expires_at| {
            let keep = *expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        self.by_session.retain(|_, token_ids| {
            token_ids.retain(|id| self.entries.contains_key(id));
            !token_ids.is_empty()
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn fresh_until_score_elapses() {
        let cache = MemoryFreshnessCache::new();
        let session = SessionId::new();
        let live = AccessTokenId("live".to_string());
        let lapsed = AccessTokenId("lapsed".to_string());

        cache
            .mark(&live, session, Utc::now() + Duration::minutes(1))
            .await
            .unwrap();
        cache
            .mark(&lapsed, session, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        assert!(cache.is_fresh(&live).await.unwrap());
        assert!(!cache.is_fresh(&lapsed).await.unwrap());
        assert!(!cache.is_fresh(&AccessTokenId("unknown".to_string())).await.unwrap());
    }

    #[tokio::test]
    async fn revoke_and_purge_remove_entries() {
        let cache = MemoryFreshnessCache::new();
        let session = SessionId::new();
        let now = Utc::now();
        for (id, offset) in [("a", -2), ("b", -1), ("c", 60), ("d", 120)] {
            cache
                .mark(&AccessTokenId(id.to_string()), session, now + Duration::seconds(offset))
                .await
                .unwrap();
        }

        cache.revoke(&AccessTokenId("d".to_string())).await.unwrap();
        assert!(!cache.is_fresh(&AccessTokenId("d".to_string())).await.unwrap());

        assert_eq!(cache.purge_expired(now).await.unwrap(), 2);
        assert!(cache.is_fresh(&AccessTokenId("c".to_string())).await.unwrap());
        assert_eq!(cache.purge_expired(now).await.unwrap(), 0);
        assert_eq!(cache.by_session.get(&session).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn revoke_session_only_touches_that_session() {
        let cache = MemoryFreshnessCache::new();
        let (doomed, other) = (SessionId::new(), SessionId::new());
        let expires_at = Utc::now() + Duration::minutes(5);
        for (id, session) in [("a", doomed), ("b", doomed), ("c", other)] {
            cache
                .mark(&AccessTokenId(id.to_string()), session, expires_at)
                .await
                .unwrap();
        }
        cache.revoke(&AccessTokenId("b".to_string())).await.unwrap();

        assert_eq!(cache.revoke_session(doomed).await.unwrap(), 1);
        assert!(!cache.is_fresh(&AccessTokenId("a".to_string())).await.unwrap());
        assert!(cache.is_fresh(&AccessTokenId("c".to_string())).await.unwrap());
        assert_eq!(cache.revoke_session(doomed).await.unwrap(), 0);
    }
}
