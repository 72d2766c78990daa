use super::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(SessionId)
    }
}

/// SHA-256 (lowercase hex) of a refresh-token id. Only hashes are persisted.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RefreshHash(pub String);

impl RefreshHash {
    pub fn of(refresh_token_id: &str) -> Self {
        RefreshHash(hex::encode(Sha256::digest(refresh_token_id.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RefreshHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the rotation ledger: which refresh ids are valid for one login.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub generation: u32,
    pub current_refresh_id: RefreshHash,
    pub previous_refresh_id: Option<RefreshHash>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RefreshState {
    Current,
    Grace,
    Stale,
}

impl Session {
    pub fn new(id: SessionId, user_id: UserId, current_refresh_id: RefreshHash) -> Self {
        Session {
            id,
            user_id,
            generation: 0,
            current_refresh_id,
            previous_refresh_id: None,
            rotated_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Where `hash` sits in this session's rotation chain at `now`.
    ///
    /// The previous hash only counts as `Grace` while `now` is within
    /// `grace_period` of the last rotation.
    pub fn classify(
        &self,
        hash: &RefreshHash,
        now: DateTime<Utc>,
        grace_period: chrono::Duration,
    ) -> RefreshState {
        if &self.current_refresh_id == hash {
            return RefreshState::Current;
        }
        match (&self.previous_refresh_id, self.rotated_at) {
            (Some(prev), Some(rotated_at)) if prev == hash && now - rotated_at <= grace_period => {
                RefreshState::Grace
            }
            _ => RefreshState::Stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rotated(rotated_at: DateTime<Utc>) -> Session {
        let mut session = Session::new(
            SessionId::new(),
            UserId(uuid::Uuid::new_v4()),
            RefreshHash::of("second"),
        );
        session.generation = 1;
        session.previous_refresh_id = Some(RefreshHash::of("first"));
        session.rotated_at = Some(rotated_at);
        session
    }

    #[test]
    fn refresh_hash_is_sha256_hex() {
        assert_eq!(
            RefreshHash::of("abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn classify_current_and_grace() {
        let now = Utc::now();
        let session = rotated(now);
        let grace = Duration::seconds(30);

        assert_eq!(
            session.classify(&RefreshHash::of("second"), now, grace),
            RefreshState::Current
        );
        assert_eq!(
            session.classify(&RefreshHash::of("first"), now, grace),
            RefreshState::Grace
        );
        assert_eq!(
            session.classify(&RefreshHash::of("zeroth"), now, grace),
            RefreshState::Stale
        );
    }

    #[test]
    fn previous_hash_goes_stale_after_grace_period() {
        let now = Utc::now();
        let session = rotated(now - Duration::seconds(31));

        assert_eq!(
            session.classify(&RefreshHash::of("first"), now, Duration::seconds(30)),
            RefreshState::Stale
        );
    }
}
