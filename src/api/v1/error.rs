use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    if let Some(err) = err.find::<ApiErrorCode>() {
        let json = warp::reply::json(&ApiResponse::<()>::err(err.clone(), err.to_string()));
        Ok(warp::reply::with_status(json, err.status()))
    } else if err.find::<warp::reject::MissingHeader>().is_some() {
        let json = warp::reply::json(&ApiResponse::<()>::err(
            ApiErrorCode::MalformedAccessToken,
            "Missing bearer token",
        ));
        Ok(warp::reply::with_status(json, StatusCode::UNAUTHORIZED))
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some()
        || err.find::<warp::reject::UnsupportedMediaType>().is_some()
        || err.find::<warp::reject::PayloadTooLarge>().is_some()
        || err.find::<warp::reject::LengthRequired>().is_some()
    {
        let json = warp::reply::json(&ApiResponse::<()>::err(
            ApiErrorCode::BadRequest,
            ApiErrorCode::BadRequest.to_string(),
        ));
        Ok(warp::reply::with_status(json, StatusCode::BAD_REQUEST))
    } else if err.is_not_found() || err.find::<warp::reject::MethodNotAllowed>().is_some() {
        let json = warp::reply::json(&ApiResponse::<()>::err(
            ApiErrorCode::NotFound,
            ApiErrorCode::NotFound.to_string(),
        ));
        Ok(warp::reply::with_status(json, StatusCode::NOT_FOUND))
    } else {
        let json = warp::reply::json(&ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ApiError {
                code: ApiErrorCode::InternalError.code(),
                message: format!("Unhandled error: {:?}", err),
            }),
        });
        Ok(warp::reply::with_status(
            json,
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum ApiErrorCode {
    #[error("Refresh token is malformed")]
    MalformedRefreshToken,
    #[error("Refresh token is not valid")]
    InvalidRefreshToken,
    #[error("Access token is malformed")]
    MalformedAccessToken,
    #[error("Access token is not valid")]
    InvalidAccessToken,
    #[error("Access token expired")]
    AccessTokenExpired,
    #[error("Bad request")]
    BadRequest,
    #[error("Not found")]
    NotFound,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn code(&self) -> u16 {
        match self {
            ApiErrorCode::MalformedRefreshToken => 301,
            ApiErrorCode::InvalidRefreshToken => 302,
            ApiErrorCode::MalformedAccessToken => 304,
            ApiErrorCode::InvalidAccessToken => 305,
            ApiErrorCode::AccessTokenExpired => 306,
            ApiErrorCode::BadRequest => 400,
            ApiErrorCode::NotFound => 404,
            ApiErrorCode::InternalError => 101,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::MalformedRefreshToken | ApiErrorCode::BadRequest => {
                StatusCode::BAD_REQUEST
            }
            ApiErrorCode::InvalidRefreshToken
            | ApiErrorCode::MalformedAccessToken
            | ApiErrorCode::InvalidAccessToken
            | ApiErrorCode::AccessTokenExpired => StatusCode::UNAUTHORIZED,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::MalformedRefreshToken => ApiErrorCode::MalformedRefreshToken,
            AuthError::InvalidRefreshToken => ApiErrorCode::InvalidRefreshToken,
            AuthError::MalformedAccessToken => ApiErrorCode::MalformedAccessToken,
            AuthError::InvalidAccessToken => ApiErrorCode::InvalidAccessToken,
            AuthError::AccessTokenExpired => ApiErrorCode::AccessTokenExpired,
            AuthError::Store(e) => ApiErrorCode::internal(e),
            AuthError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_keep_their_numeric_codes() {
        let cases = [
            AuthError::MalformedRefreshToken,
            AuthError::InvalidRefreshToken,
            AuthError::MalformedAccessToken,
            AuthError::InvalidAccessToken,
            AuthError::AccessTokenExpired,
            AuthError::Store("down".to_string()),
        ];
        for error in cases {
            let expected = error.code();
            assert_eq!(ApiErrorCode::from(error).code(), expected);
        }
    }
}
