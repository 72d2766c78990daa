use super::util::{store_err, uuid_from_bytes};
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_common::within_deadline;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use std::time::Duration;

const SELECT_SESSION: &str = r#"
SELECT id, user_id, generation, current_refresh_id, previous_refresh_id, rotated_at, updated_at
FROM auth_session
"#;

pub struct MySqlSessionLedger {
    pool: MySqlPool,
    deadline: Duration,
}

impl MySqlSessionLedger {
    pub fn new(pool: MySqlPool, deadline: Duration) -> Self {
        MySqlSessionLedger { pool, deadline }
    }

    #[inline]
    fn sid_as_bytes(id: &SessionId) -> &[u8] {
        id.0.as_bytes()
    }

    #[inline]
    fn uid_as_bytes(id: &UserId) -> &[u8] {
        id.0.as_bytes()
    }

    fn row_to_session(row: MySqlRow) -> Result<Session, LedgerError> {
        let id_bytes: Vec<u8> = row.try_get("id").map_err(store_err)?;
        let user_id_bytes: Vec<u8> = row.try_get("user_id").map_err(store_err)?;
        let generation: u32 = row.try_get("generation").map_err(store_err)?;
        let current_refresh_id: String = row.try_get("current_refresh_id").map_err(store_err)?;
        let previous_refresh_id: Option<String> =
            row.try_get("previous_refresh_id").map_err(store_err)?;
        let rotated_at: Option<DateTime<Utc>> = row.try_get("rotated_at").map_err(store_err)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(store_err)?;

        Ok(Session {
            id: SessionId(uuid_from_bytes(&id_bytes)?),
            user_id: UserId(uuid_from_bytes(&user_id_bytes)?),
            generation,
            current_refresh_id: RefreshHash(current_refresh_id),
            previous_refresh_id: previous_refresh_id.map(RefreshHash),
            rotated_at,
            updated_at,
        })
    }

    /// Tells a lost conditional update (row still there) from a missing row.
    async fn conflict_or_missing(&self, session_id: SessionId) -> LedgerError {
        let exists = within_deadline(
            self.deadline,
            sqlx::query_scalar::<_, i64>("SELECT 1 FROM auth_session WHERE id = ?")
                .bind(Self::sid_as_bytes(&session_id))
                .fetch_optional(&self.pool),
        )
        .await;

        match exists {
            Ok(Some(_)) => LedgerError::Conflict,
            Ok(None) => LedgerError::NotFound,
            Err(e) => LedgerError::Store(e),
        }
    }
}

#[async_trait::async_trait]
impl SessionLedger for MySqlSessionLedger {
    async fn create(&self, session: &Session) -> Result<(), LedgerError> {
        within_deadline(
            self.deadline,
            sqlx::query(
                r#"
INSERT INTO auth_session
    (id, user_id, generation, current_refresh_id, previous_refresh_id, rotated_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?, ?)
"#,
            )
            .bind(Self::sid_as_bytes(&session.id))
            .bind(Self::uid_as_bytes(&session.user_id))
            .bind(session.generation)
            .bind(session.current_refresh_id.as_str())
            .bind(session.previous_refresh_id.as_ref().map(RefreshHash::as_str))
            .bind(session.rotated_at)
            .bind(session.updated_at)
            .execute(&self.pool),
        )
        .await
        .map_err(LedgerError::Store)?;

        Ok(())
    }

    async fn find(&self, session_id: SessionId) -> Result<Session, LedgerError> {
        let sql = format!("{SELECT_SESSION} WHERE id = ?");
        let row_opt: Option<MySqlRow> = within_deadline(
            self.deadline,
            sqlx::query(&sql)
                .bind(Self::sid_as_bytes(&session_id))
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(LedgerError::Store)?;

        row_opt
            .map(Self::row_to_session)
            .transpose()?
            .ok_or(LedgerError::NotFound)
    }

    async fn find_by_refresh_hash(
        &self,
        user_id: UserId,
        hash: &RefreshHash,
        include_parent: bool,
    ) -> Result<Session, LedgerError> {
        let sql = if include_parent {
            format!(
                "{SELECT_SESSION} WHERE user_id = ? AND (current_refresh_id = ? OR previous_refresh_id = ?) LIMIT 1"
            )
        } else {
            format!("{SELECT_SESSION} WHERE user_id = ? AND current_refresh_id = ? LIMIT 1")
        };

        let mut query = sqlx::query(&sql)
            .bind(Self::uid_as_bytes(&user_id))
            .bind(hash.as_str());
        if include_parent {
            query = query.bind(hash.as_str());
        }

        let row_opt: Option<MySqlRow> =
            within_deadline(self.deadline, query.fetch_optional(&self.pool))
                .await
                .map_err(LedgerError::Store)?;

        row_opt
            .map(Self::row_to_session)
            .transpose()?
            .ok_or(LedgerError::NotFound)
    }

    async fn compare_and_rotate(
        &self,
        session_id: SessionId,
        expected_current: &RefreshHash,
        new_current: &RefreshHash,
    ) -> Result<(), LedgerError> {
        let now = Utc::now();
        let result = within_deadline(
            self.deadline,
            sqlx::query(
                r#"
UPDATE auth_session
SET previous_refresh_id = ?,
    current_refresh_id = ?,
    generation = generation + 1,
    rotated_at = ?,
    updated_at = ?
WHERE id = ? AND current_refresh_id = ?
"#,
            )
            .bind(expected_current.as_str())
            .bind(new_current.as_str())
            .bind(now)
            .bind(now)
            .bind(Self::sid_as_bytes(&session_id))
            .bind(expected_current.as_str())
            .execute(&self.pool),
        )
        .await
        .map_err(LedgerError::Store)?;

        if result.rows_affected() == 1 {
            Ok(())
        } else {
            Err(self.conflict_or_missing(session_id).await)
        }
    }

    async fn promote_grace_use(
        &self,
        session_id: SessionId,
        expected_previous: &RefreshHash,
    ) -> Result<(), LedgerError> {
        let result = within_deadline(
            self.deadline,
            sqlx::query(
                r#"
UPDATE auth_session
SET updated_at = ?
WHERE id = ? AND previous_refresh_id = ?
"#,
            )
            .bind(Utc::now())
            .bind(Self::sid_as_bytes(&session_id))
            .bind(expected_previous.as_str())
            .execute(&self.pool),
        )
        .await
        .map_err(LedgerError::Store)?;

        if result.rows_affected() == 1 {
            Ok(())
        } else {
            Err(self.conflict_or_missing(session_id).await)
        }
    }

    async fn count_by_user(&self, user_id: UserId) -> Result<u64, LedgerError> {
        let count: i64 = within_deadline(
            self.deadline,
            sqlx::query_scalar("SELECT COUNT(*) FROM auth_session WHERE user_id = ?")
                .bind(Self::uid_as_bytes(&user_id))
                .fetch_one(&self.pool),
        )
        .await
        .map_err(LedgerError::Store)?;

        Ok(count.max(0) as u64)
    }

    async fn delete_oldest_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<SessionId>, LedgerError> {
        let oldest: Option<Vec<u8>> = within_deadline(
            self.deadline,
            sqlx::query_scalar(
                r#"
SELECT id FROM auth_session
WHERE user_id = ?
ORDER BY updated_at ASC
LIMIT 1
"#,
            )
            .bind(Self::uid_as_bytes(&user_id))
            .fetch_optional(&self.pool),
        )
        .await
        .map_err(LedgerError::Store)?;

        let Some(id_bytes) = oldest else {
            return Ok(None);
        };
        let session_id = SessionId(uuid_from_bytes(&id_bytes)?);

        match self.delete(session_id).await {
            Ok(()) => Ok(Some(session_id)),
            // a concurrent logout got there first
            Err(LedgerError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, session_id: SessionId) -> Result<(), LedgerError> {
        let result = within_deadline(
            self.deadline,
            sqlx::query("DELETE FROM auth_session WHERE id = ?")
                .bind(Self::sid_as_bytes(&session_id))
                .execute(&self.pool),
        )
        .await
        .map_err(LedgerError::Store)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound);
        }
        Ok(())
    }
}
