use super::error::*;
use super::handler;
use crate::application_port::*;
use crate::domain_model::UserId;
use crate::server::*;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, http, reject};

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    token_routes(server.token_service.clone())
}

pub fn token_routes(
    token_service: Arc<dyn TokenService>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let refresh = warp::post()
        .and(warp::path!("tokens" / "refresh"))
        .and(form_or_json())
        .and(with(token_service.clone()))
        .and_then(handler::refresh);

    let remove = warp::post()
        .and(warp::path!("tokens" / "remove"))
        .and(form_or_json())
        .and(warp::header::optional::<String>(
            http::header::AUTHORIZATION.as_ref(),
        ))
        .and(with(token_service.clone()))
        .and_then(handler::remove);

    let verify = warp::get()
        .and(warp::path!("tokens" / "verify"))
        .and(with_verification(token_service))
        .and_then(handler::verify);

    refresh.or(remove).or(verify)
}

/// Liveness probe, served outside `/api/v1`.
pub fn health() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::get()
        .and(warp::path!("_health"))
        .map(|| http::StatusCode::OK)
}

/// `application/x-www-form-urlencoded` or JSON; each branch checks the
/// content type before it takes the body.
fn form_or_json<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
where
    T: DeserializeOwned + Send + 'static,
{
    warp::body::content_length_limit(16 * 1024)
        .and(warp::body::form::<T>().or(warp::body::json::<T>()).unify())
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_verification(
    token_service: Arc<dyn TokenService>,
) -> impl Filter<Extract = (UserId,), Error = warp::Rejection> + Clone {
    warp::header::<String>(http::header::AUTHORIZATION.as_ref()).and_then(move |token: String| {
        let token_service = token_service.clone();
        async move {
            if let Some(token) = token.strip_prefix("Bearer ") {
                let claims = token_service
                    .validate_access_token(&AccessToken(token.to_string()))
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok(claims.user_id)
            } else {
                Err(reject::custom(ApiErrorCode::MalformedAccessToken))
            }
        }
    })
}
