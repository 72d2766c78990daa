use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub signing_key: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessJwtClaims {
    sub: String, // user id as string
    jti: String,
    rt_id: String, // hash of the refresh id this token is bound to
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
}

/// No `exp`/`iat`: refresh validity lives in the ledger, and identical claims
/// must sign to an identical string.
#[derive(Debug, Serialize, Deserialize)]
struct RefreshJwtClaims {
    sub: String,
    sid: String,
    jti: String,
    iss: String,
    aud: String,
}

pub struct JwtHs256Codec {
    cfg: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(&cfg.signing_key);
        let decoding_key = DecodingKey::from_secret(&cfg.signing_key);
        JwtHs256Codec {
            cfg,
            encoding_key,
            decoding_key,
        }
    }

    fn validation(&self) -> Validation {
        let mut v = Validation::new(Algorithm::HS256);
        v.leeway = 0;
        v.set_audience(&[self.cfg.audience.clone()]);
        v.set_issuer(&[self.cfg.issuer.clone()]);
        v
    }

    fn decode_access(&self, token: &str, validate_exp: bool) -> Result<AccessClaims, AuthError> {
        let mut v = self.validation();
        v.validate_exp = validate_exp;
        let data = decode::<AccessJwtClaims>(token, &self.decoding_key, &v).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::AccessTokenExpired,
                _ => AuthError::MalformedAccessToken,
            }
        })?;
        let claims = data.claims;

        let user_id = claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::MalformedAccessToken)?;
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or(AuthError::MalformedAccessToken)?;

        Ok(AccessClaims {
            user_id,
            token_id: AccessTokenId(claims.jti),
            bound_refresh_id: RefreshHash(claims.rt_id),
            expires_at,
        })
    }
}

impl TokenCodec for JwtHs256Codec {
    fn sign_access(&self, claims: &AccessClaims) -> Result<AccessToken, AuthError> {
        let wire = AccessJwtClaims {
            sub: claims.user_id.to_string(),
            jti: claims.token_id.0.clone(),
            rt_id: claims.bound_refresh_id.0.clone(),
            exp: claims.expires_at.timestamp(),
            iat: Utc::now().timestamp(),
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &wire, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(e.to_string()))?;
        Ok(AccessToken(token))
    }

    fn verify_access(&self, token: &AccessToken) -> Result<AccessClaims, AuthError> {
        self.decode_access(&token.0, true)
    }

    fn verify_access_ignoring_expiry(
        &self,
        token: &AccessToken,
    ) -> Result<AccessClaims, AuthError> {
        self.decode_access(&token.0, false)
    }

    fn sign_refresh(&self, claims: &RefreshClaims) -> Result<RefreshToken, AuthError> {
        let wire = RefreshJwtClaims {
            sub: claims.user_id.to_string(),
            sid: claims.session_id.to_string(),
            jti: claims.token_id.clone(),
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &wire, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(e.to_string()))?;
        Ok(RefreshToken(token))
    }

    fn verify_refresh(&self, token: &RefreshToken) -> Result<RefreshClaims, AuthError> {
        let mut v = self.validation();
        v.validate_exp = false;
        v.required_spec_claims = HashSet::new();
        let data = decode::<RefreshJwtClaims>(&token.0, &self.decoding_key, &v)
            .map_err(|_| AuthError::MalformedRefreshToken)?;
        let claims = data.claims;

        let user_id = claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::MalformedRefreshToken)?;
        let session_id = claims
            .sid
            .parse::<SessionId>()
            .map_err(|_| AuthError::MalformedRefreshToken)?;
        if claims.jti.is_empty() {
            return Err(AuthError::MalformedRefreshToken);
        }

        Ok(RefreshClaims {
            user_id,
            token_id: claims.jti,
            session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, SubsecRound};

    fn codec(key: &str) -> JwtHs256Codec {
        JwtHs256Codec::new(JwtConfig {
            issuer: "rotation.test".to_string(),
            audience: "api-client".to_string(),
            signing_key: key.as_bytes().to_vec(),
        })
    }

    fn access_claims(expires_at: DateTime<Utc>) -> AccessClaims {
        AccessClaims {
            user_id: UserId(uuid::Uuid::new_v4()),
            token_id: AccessTokenId::generate(),
            bound_refresh_id: RefreshHash::of("refresh-id"),
            expires_at: expires_at.trunc_subsecs(0),
        }
    }

    #[test]
    fn access_token_verifies_back_to_its_claims() {
        let codec = codec("secret");
        let claims = access_claims(Utc::now() + Duration::minutes(5));
        let token = codec.sign_access(&claims).unwrap();

        assert_eq!(codec.verify_access(&token).unwrap(), claims);
    }

    #[test]
    fn expired_access_token_is_reported_as_expired() {
        let codec = codec("secret");
        let claims = access_claims(Utc::now() - Duration::minutes(5));
        let token = codec.sign_access(&claims).unwrap();

        assert!(matches!(
            codec.verify_access(&token),
            Err(AuthError::AccessTokenExpired)
        ));
        assert_eq!(
            codec.verify_access_ignoring_expiry(&token).unwrap().token_id,
            claims.token_id
        );
    }

    #[test]
    fn foreign_signature_is_malformed() {
        let claims = access_claims(Utc::now() + Duration::minutes(5));
        let token = codec("other-secret").sign_access(&claims).unwrap();

        assert!(matches!(
            codec("secret").verify_access(&token),
            Err(AuthError::MalformedAccessToken)
        ));
        assert!(matches!(
            codec("secret").verify_refresh(&RefreshToken("not.a.jwt".to_string())),
            Err(AuthError::MalformedRefreshToken)
        ));
    }

    #[test]
    fn refresh_signing_is_deterministic() {
        let codec = codec("secret");
        let claims = RefreshClaims {
            user_id: UserId(uuid::Uuid::new_v4()),
            token_id: "0123456789abcdef".to_string(),
            session_id: SessionId::new(),
        };

        let first = codec.sign_refresh(&claims).unwrap();
        let second = codec.sign_refresh(&claims).unwrap();

        assert_eq!(first, second);
        assert_eq!(codec.verify_refresh(&first).unwrap(), claims);
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let codec = codec("secret");
        let token = codec
            .sign_access(&access_claims(Utc::now() + Duration::minutes(5)))
            .unwrap();

        assert!(matches!(
            codec.verify_refresh(&RefreshToken(token.0)),
            Err(AuthError::MalformedRefreshToken)
        ));
    }
}
