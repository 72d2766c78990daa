use super::error::*;
use crate::application_port::*;
use crate::domain_model::UserId;
use crate::logger::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.code(),
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub expires_at: DateTime<Utc>,
}

impl From<AuthTokens> for RefreshResponse {
    fn from(tokens: AuthTokens) -> Self {
        RefreshResponse {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.access_token_expires_at,
        }
    }
}

pub async fn refresh(
    body: RefreshRequest,
    token_service: Arc<dyn TokenService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let tokens = token_service
        .refresh(&RefreshToken(body.refresh_token))
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(RefreshResponse::from(
        tokens,
    ))))
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse;

pub async fn remove(
    body: RemoveRequest,
    bearer: Option<String>,
    token_service: Arc<dyn TokenService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    token_service
        .revoke(&RefreshToken(body.refresh_token))
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    // the session is gone either way; a bad bearer only leaves that access
    // token alive until it expires
    if let Some(access) = bearer.as_deref().and_then(|h| h.strip_prefix("Bearer ")) {
        if let Err(e) = token_service
            .revoke_access_token(&AccessToken(access.to_string()))
            .await
        {
            warn!("access token not revoked on logout: {}", e);
        }
    }

    Ok(warp::reply::json(&ApiResponse::ok(RemoveResponse)))
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub user_id: UserId,
}

pub async fn verify(user_id: UserId) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(VerifyResponse {
        user_id,
    })))
}
