use super::RefreshIdDeriver;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{SubsecRound, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub access_ttl: Duration,
    /// How long a just-superseded refresh token keeps working.
    pub grace_period: Duration,
    pub session_limit_per_user: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        RotationConfig {
            access_ttl: Duration::from_secs(60 * 60),
            grace_period: Duration::from_secs(30),
            session_limit_per_user: 5,
        }
    }
}

impl From<LedgerError> for AuthError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::NotFound | LedgerError::Conflict => AuthError::InvalidRefreshToken,
            LedgerError::Store(e) => AuthError::Store(e),
        }
    }
}

impl From<CacheError> for AuthError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::Store(e) => AuthError::Store(e),
        }
    }
}

fn bounded_delta(duration: Duration) -> TimeDelta {
    let ceiling = TimeDelta::days(365);
    TimeDelta::from_std(duration).map_or(ceiling, |d| d.min(ceiling))
}

/// Result of one classification attempt during refresh.
enum Step {
    Done(AuthTokens),
    /// The row changed under us; re-read and classify again.
    Conflict,
}

struct MintedAccess {
    claims: AccessClaims,
    token: AccessToken,
}

/// Rotation engine: the only component that touches both the ledger and the
/// freshness cache. Holds no mutable state of its own.
pub struct RealTokenService {
    ledger: Arc<dyn SessionLedger>,
    cache: Arc<dyn FreshnessCache>,
    codec: Arc<dyn TokenCodec>,
    refresh_ids: RefreshIdDeriver,
    access_ttl: TimeDelta,
    grace_period: TimeDelta,
    session_limit: u64,
}

impl RealTokenService {
    pub fn new(
        ledger: Arc<dyn SessionLedger>,
        cache: Arc<dyn FreshnessCache>,
        codec: Arc<dyn TokenCodec>,
        refresh_ids: RefreshIdDeriver,
        config: RotationConfig,
    ) -> Self {
        Self {
            ledger,
            cache,
            codec,
            refresh_ids,
            access_ttl: bounded_delta(config.access_ttl),
            grace_period: bounded_delta(config.grace_period),
            session_limit: config.session_limit_per_user.max(1),
        }
    }

    fn mint_access(
        &self,
        user_id: UserId,
        bound_refresh_id: &RefreshHash,
    ) -> Result<MintedAccess, AuthError> {
        let claims = AccessClaims {
            user_id,
            token_id: AccessTokenId::generate(),
            bound_refresh_id: bound_refresh_id.clone(),
            // exp travels in whole seconds
            expires_at: (Utc::now() + self.access_ttl).trunc_subsecs(0),
        };
        let token = self.codec.sign_access(&claims)?;
        Ok(MintedAccess { claims, token })
    }

    fn sign_refresh(
        &self,
        session: &Session,
        refresh_id: String,
    ) -> Result<RefreshToken, AuthError> {
        self.codec.sign_refresh(&RefreshClaims {
            user_id: session.user_id,
            token_id: refresh_id,
            session_id: session.id,
        })
    }

    /// Marks the access token fresh and packs the response. Always called
    /// after the ledger write it depends on.
    async fn publish(
        &self,
        session_id: SessionId,
        access: MintedAccess,
        refresh_token: RefreshToken,
    ) -> Result<AuthTokens, AuthError> {
        self.cache
            .mark(&access.claims.token_id, session_id, access.claims.expires_at)
            .await?;
        Ok(AuthTokens {
            access_token: access.token,
            refresh_token,
            access_token_expires_at: access.claims.expires_at,
        })
    }

    async fn enforce_session_limit(&self, user_id: UserId) -> Result<Vec<SessionId>, AuthError> {
        let count = self.ledger.count_by_user(user_id).await?;
        let excess = (count + 1).saturating_sub(self.session_limit);

        let mut evicted = Vec::new();
        for _ in 0..excess {
            if let Some(session_id) = self.ledger.delete_oldest_by_user(user_id).await? {
                self.cache.revoke_session(session_id).await?;
                info!(%user_id, %session_id, "session limit reached, evicted oldest session");
                evicted.push(session_id);
            }
        }
        Ok(evicted)
    }

    /// Finds the session a refresh token belongs to. A token that matches
    /// neither hash is still traced through its session claim so that reuse
    /// of an old token can revoke the session.
    async fn locate(
        &self,
        claims: &RefreshClaims,
        hash: &RefreshHash,
    ) -> Result<Session, AuthError> {
        match self
            .ledger
            .find_by_refresh_hash(claims.user_id, hash, true)
            .await
        {
            Ok(session) if session.id == claims.session_id => return Ok(session),
            Ok(_) => return Err(AuthError::InvalidRefreshToken),
            Err(LedgerError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        match self.ledger.find(claims.session_id).await {
            Ok(session) if session.user_id == claims.user_id => Ok(session),
            Ok(_) | Err(LedgerError::NotFound) => Err(AuthError::InvalidRefreshToken),
            Err(e) => Err(e.into()),
        }
    }

    async fn reread(&self, session_id: SessionId) -> Result<Session, AuthError> {
        match self.ledger.find(session_id).await {
            Ok(session) => Ok(session),
            Err(LedgerError::NotFound) => Err(AuthError::InvalidRefreshToken),
            Err(e) => Err(e.into()),
        }
    }

    async fn rotate(&self, session: &Session, hash: &RefreshHash) -> Result<Step, AuthError> {
        let refresh_id = self
            .refresh_ids
            .derive(session.id, session.generation + 1);
        let next_hash = RefreshHash::of(&refresh_id);

        let refresh_token = self.sign_refresh(session, refresh_id)?;
        let access = self.mint_access(session.user_id, &next_hash)?;

        match self
            .ledger
            .compare_and_rotate(session.id, hash, &next_hash)
            .await
        {
            Ok(()) => {}
            Err(LedgerError::Conflict) => return Ok(Step::Conflict),
            Err(e) => return Err(e.into()),
        }
        debug!(session_id = %session.id, generation = session.generation + 1, "refresh token rotated");

        Ok(Step::Done(
            self.publish(session.id, access, refresh_token).await?,
        ))
    }

    async fn serve_grace(&self, session: &Session, hash: &RefreshHash) -> Result<Step, AuthError> {
        // hand out the refresh token the winning caller already received
        let refresh_id = self.refresh_ids.derive(session.id, session.generation);
        let refresh_token = self.sign_refresh(session, refresh_id)?;
        let access = self.mint_access(session.user_id, &session.current_refresh_id)?;

        match self.ledger.promote_grace_use(session.id, hash).await {
            Ok(()) => {}
            Err(LedgerError::Conflict) => return Ok(Step::Conflict),
            Err(e) => return Err(e.into()),
        }
        debug!(session_id = %session.id, "refresh served from grace window");

        Ok(Step::Done(
            self.publish(session.id, access, refresh_token).await?,
        ))
    }

    async fn revoke_on_reuse(&self, session: &Session) -> Result<AuthTokens, AuthError> {
        warn!(
            user_id = %session.user_id,
            session_id = %session.id,
            "stale refresh token presented, revoking session"
        );
        self.end_session(session.id).await?;
        Err(AuthError::InvalidRefreshToken)
    }

    /// Deletes the ledger row, then every access token the session minted.
    async fn end_session(&self, session_id: SessionId) -> Result<(), AuthError> {
        match self.ledger.delete(session_id).await {
            Ok(()) | Err(LedgerError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        let revoked = self.cache.revoke_session(session_id).await?;
        debug!(%session_id, revoked, "access tokens of ended session revoked");
        Ok(())
    }
}

#[async_trait::async_trait]
impl TokenService for RealTokenService {
    async fn issue(&self, user_id: UserId) -> Result<IssueResult, AuthError> {
        let evicted = self.enforce_session_limit(user_id).await?;

        let session_id = SessionId::new();
        let refresh_id = self.refresh_ids.derive(session_id, 0);
        let session = Session::new(session_id, user_id, RefreshHash::of(&refresh_id));

        let refresh_token = self.sign_refresh(&session, refresh_id)?;
        let access = self.mint_access(user_id, &session.current_refresh_id)?;

        self.ledger.create(&session).await?;
        let tokens = match self.publish(session_id, access, refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                if let Err(cleanup) = self.ledger.delete(session_id).await {
                    warn!(%user_id, %session_id, "orphaned session left in ledger: {}", cleanup);
                }
                return Err(e);
            }
        };
        debug!(%user_id, %session_id, "session issued");

        Ok(IssueResult {
            user_id,
            session_id,
            tokens,
            evicted,
        })
    }

    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<AuthTokens, AuthError> {
        let claims = self.codec.verify_refresh(refresh_token)?;
        let hash = RefreshHash::of(&claims.token_id);

        let mut session = self.locate(&claims, &hash).await?;
        let mut reclassified = false;
        loop {
            let step = match session.classify(&hash, Utc::now(), self.grace_period) {
                RefreshState::Current => self.rotate(&session, &hash).await?,
                RefreshState::Grace => self.serve_grace(&session, &hash).await?,
                RefreshState::Stale => return self.revoke_on_reuse(&session).await,
            };

            match step {
                Step::Done(tokens) => return Ok(tokens),
                Step::Conflict if !reclassified => {
                    debug!(session_id = %session.id, "concurrent rotation, re-classifying");
                    reclassified = true;
                    session = self.reread(session.id).await?;
                }
                Step::Conflict => {
                    warn!(session_id = %session.id, "rotation conflict persisted after retry");
                    return Err(AuthError::InvalidRefreshToken);
                }
            }
        }
    }

    async fn validate_access_token(&self, token: &AccessToken) -> Result<AccessClaims, AuthError> {
        let claims = self.codec.verify_access(token)?;
        if !self.cache.is_fresh(&claims.token_id).await? {
            return Err(AuthError::InvalidAccessToken);
        }
        Ok(claims)
    }

    async fn revoke(&self, refresh_token: &RefreshToken) -> Result<(), AuthError> {
        let claims = self.codec.verify_refresh(refresh_token)?;
        let hash = RefreshHash::of(&claims.token_id);

        // only the current token may log out
        let session = self
            .ledger
            .find_by_refresh_hash(claims.user_id, &hash, false)
            .await?;
        self.end_session(session.id).await?;
        info!(user_id = %claims.user_id, session_id = %session.id, "session revoked");
        Ok(())
    }

    async fn revoke_access_token(&self, token: &AccessToken) -> Result<(), AuthError> {
        let claims = self.codec.verify_access_ignoring_expiry(token)?;
        self.cache.revoke(&claims.token_id).await?;
        Ok(())
    }
}
