use crate::domain_model::*;

/// Durable store of rotation state, one row per login session.
///
/// Implementations must make `compare_and_rotate` and `promote_grace_use`
/// atomic conditional writes on a single row; the engine relies on them
/// instead of any in-process lock.
#[async_trait::async_trait]
pub trait SessionLedger: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), LedgerError>;

    async fn find(&self, session_id: SessionId) -> Result<Session, LedgerError>;

    /// Match on `current_refresh_id`, or also `previous_refresh_id` when
    /// `include_parent` is set.
    async fn find_by_refresh_hash(
        &self,
        user_id: UserId,
        hash: &RefreshHash,
        include_parent: bool,
    ) -> Result<Session, LedgerError>;

    /// Moves `expected_current` into the previous slot and installs
    /// `new_current`, only if the stored current hash still equals
    /// `expected_current`. Bumps `generation`, `rotated_at` and `updated_at`.
    async fn compare_and_rotate(
        &self,
        session_id: SessionId,
        expected_current: &RefreshHash,
        new_current: &RefreshHash,
    ) -> Result<(), LedgerError>;

    /// Bumps `updated_at` only, provided the previous slot still holds
    /// `expected_previous`.
    async fn promote_grace_use(
        &self,
        session_id: SessionId,
        expected_previous: &RefreshHash,
    ) -> Result<(), LedgerError>;

    async fn count_by_user(&self, user_id: UserId) -> Result<u64, LedgerError>;

    /// Deletes the least-recently-updated session of the user, if any.
    async fn delete_oldest_by_user(&self, user_id: UserId)
    -> Result<Option<SessionId>, LedgerError>;

    async fn delete(&self, session_id: SessionId) -> Result<(), LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("session not found")]
    NotFound,
    #[error("session was rotated concurrently")]
    Conflict,
    #[error("ledger store error: {0}")]
    Store(String),
}
