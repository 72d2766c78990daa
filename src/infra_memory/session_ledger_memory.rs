use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

struct Row {
    session: Session,
    // breaks updated_at ties so eviction order is strict
    touched: u64,
}

/// Process-local ledger. Conditional writes run under the map's per-entry
/// lock, which gives the same single-row atomicity as the SQL ledger.
pub struct MemorySessionLedger {
    rows: DashMap<SessionId, Row>,
    clock: AtomicU64,
}

impl MemorySessionLedger {
    pub fn new() -> Self {
        MemorySessionLedger {
            rows: DashMap::new(),
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for MemorySessionLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionLedger for MemorySessionLedger {
    async fn create(&self, session: &Session) -> Result<(), LedgerError> {
        let row = Row {
            session: session.clone(),
            touched: self.tick(),
        };
        if self.rows.insert(session.id, row).is_some() {
            return Err(LedgerError::Store(format!(
                "duplicate session id {}",
                session.id
            )));
        }
        Ok(())
    }

    async fn find(&self, session_id: SessionId) -> Result<Session, LedgerError> {
        self.rows
            .get(&session_id)
            .map(|row| row.session.clone())
            .ok_or(LedgerError::NotFound)
    }

    async fn find_by_refresh_hash(
        &self,
        user_id: UserId,
        hash: &RefreshHash,
        include_parent: bool,
    ) -> Result<Session, LedgerError> {
        self.rows
            .iter()
            .find(|row| {
                let s = &row.session;
                s.user_id == user_id
                    && (&s.current_refresh_id == hash
                        || (include_parent && s.previous_refresh_id.as_ref() == Some(hash)))
            })
            .map(|row| row.session.clone())
            .ok_or(LedgerError::NotFound)
    }

    async fn compare_and_rotate(
        &self,
        session_id: SessionId,
        expected_current: &RefreshHash,
        new_current: &RefreshHash,
    ) -> Result<(), LedgerError> {
        let mut row = self
            .rows
            .get_mut(&session_id)
            .ok_or(LedgerError::NotFound)?;
        if &row.session.current_refresh_id != expected_current {
            return Err(LedgerError::Conflict);
        }

        let now = Utc::now();
        let touched = self.tick();
        let s = &mut row.session;
        s.previous_refresh_id = Some(expected_current.clone());
        s.current_refresh_id = new_current.clone();
        s.generation += 1;
        s.rotated_at = Some(now);
        s.updated_at = now;
        row.touched = touched;
        Ok(())
    }

    async fn promote_grace_use(
        &self,
        session_id: SessionId,
        expected_previous: &RefreshHash,
    ) -> Result<(), LedgerError> {
        let mut row = self
            .rows
            .get_mut(&session_id)
            .ok_or(LedgerError::NotFound)?;
        if row.session.previous_refresh_id.as_ref() != Some(expected_previous) {
            return Err(LedgerError::Conflict);
        }

        row.session.updated_at = Utc::now();
        row.touched = self.tick();
        Ok(())
    }

    async fn count_by_user(&self, user_id: UserId) -> Result<u64, LedgerError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| row.session.user_id == user_id)
            .count() as u64)
    }

    async fn delete_oldest_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<SessionId>, LedgerError> {
        let oldest = self
            .rows
            .iter()
            .filter(|row| row.session.user_id == user_id)
            .min_by_key(|row| (row.session.updated_at, row.touched))
            .map(|row| row.session.id);

        Ok(oldest.and_then(|id| self.rows.remove(&id).map(|(id, _)| id)))
    }

    async fn delete(&self, session_id: SessionId) -> Result<(), LedgerError> {
        self.rows
            .remove(&session_id)
            .map(|_| ())
            .ok_or(LedgerError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_for(user_id: UserId, refresh_id: &str) -> Session {
        Session::new(SessionId::new(), user_id, RefreshHash::of(refresh_id))
    }

    #[tokio::test]
    async fn find_by_hash_respects_user_and_parent_flag() {
        let ledger = MemorySessionLedger::new();
        let uid = UserId(uuid::Uuid::new_v4());
        let session = session_for(uid, "r0");
        ledger.create(&session).await.unwrap();
        ledger
            .compare_and_rotate(session.id, &RefreshHash::of("r0"), &RefreshHash::of("r1"))
            .await
            .unwrap();

        let r0 = RefreshHash::of("r0");
        assert!(matches!(
            ledger.find_by_refresh_hash(uid, &r0, false).await,
            Err(LedgerError::NotFound)
        ));
        assert_eq!(
            ledger.find_by_refresh_hash(uid, &r0, true).await.unwrap().id,
            session.id
        );
        assert!(matches!(
            ledger
                .find_by_refresh_hash(UserId(uuid::Uuid::new_v4()), &r0, true)
                .await,
            Err(LedgerError::NotFound)
        ));
    }

    #[tokio::test]
    async fn compare_and_rotate_rejects_stale_expectation() {
        let ledger = MemorySessionLedger::new();
        let session = session_for(UserId(uuid::Uuid::new_v4()), "r0");
        ledger.create(&session).await.unwrap();

        let (r0, r1, r2) = (
            RefreshHash::of("r0"),
            RefreshHash::of("r1"),
            RefreshHash::of("r2"),
        );
        ledger.compare_and_rotate(session.id, &r0, &r1).await.unwrap();
        assert!(matches!(
            ledger.compare_and_rotate(session.id, &r0, &r2).await,
            Err(LedgerError::Conflict)
        ));

        let stored = ledger.find(session.id).await.unwrap();
        assert_eq!(stored.current_refresh_id, r1);
        assert_eq!(stored.previous_refresh_id, Some(r0));
        assert_eq!(stored.generation, 1);

        assert!(matches!(
            ledger.compare_and_rotate(SessionId::new(), &r1, &r2).await,
            Err(LedgerError::NotFound)
        ));
    }

    #[tokio::test]
    async fn promote_grace_use_only_touches_timestamp() {
        let ledger = MemorySessionLedger::new();
        let session = session_for(UserId(uuid::Uuid::new_v4()), "r0");
        ledger.create(&session).await.unwrap();
        let (r0, r1) = (RefreshHash::of("r0"), RefreshHash::of("r1"));
        ledger.compare_and_rotate(session.id, &r0, &r1).await.unwrap();
        let rotated = ledger.find(session.id).await.unwrap();

        ledger.promote_grace_use(session.id, &r0).await.unwrap();
        let promoted = ledger.find(session.id).await.unwrap();
        assert_eq!(promoted.current_refresh_id, rotated.current_refresh_id);
        assert_eq!(promoted.previous_refresh_id, rotated.previous_refresh_id);
        assert_eq!(promoted.rotated_at, rotated.rotated_at);
        assert!(promoted.updated_at >= rotated.updated_at);

        assert!(matches!(
            ledger.promote_grace_use(session.id, &r1).await,
            Err(LedgerError::Conflict)
        ));
    }

    #[tokio::test]
    async fn delete_oldest_picks_least_recently_updated() {
        let ledger = MemorySessionLedger::new();
        let uid = UserId(uuid::Uuid::new_v4());
        let first = session_for(uid, "a");
        let second = session_for(uid, "b");
        let other_user = session_for(UserId(uuid::Uuid::new_v4()), "c");
        for s in [&first, &second, &other_user] {
            ledger.create(s).await.unwrap();
        }
        ledger
            .compare_and_rotate(first.id, &RefreshHash::of("a"), &RefreshHash::of("a2"))
            .await
            .unwrap();

        assert_eq!(ledger.count_by_user(uid).await.unwrap(), 2);
        assert_eq!(
            ledger.delete_oldest_by_user(uid).await.unwrap(),
            Some(second.id)
        );
        assert_eq!(ledger.count_by_user(uid).await.unwrap(), 1);
        assert_eq!(ledger.count_by_user(other_user.user_id).await.unwrap(), 1);

        ledger.delete(first.id).await.unwrap();
        assert_eq!(ledger.delete_oldest_by_user(uid).await.unwrap(), None);
    }
}
