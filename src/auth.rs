use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warp::{
    Filter, Rejection,
    filters::header::headers_cloned,
    http::header::{self, HeaderMap},
};

use crate::{AppState, error::Error, with_state};

pub const TOKEN_ISSUER: &str = "tubely-access";
const JWT_BEARER_PREFIX: &str = "Bearer ";

/// Struct encoded in the JWT, `sub` is the id of the authenticated user.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

/// Warp filter for requests that require a user authenticated by the bearer token.
pub fn with_user_id(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Uuid,), Error = Rejection> + Clone {
    headers_cloned()
        .and(with_state(state))
        .and_then(require_user_id)
}

async fn require_user_id(header_map: HeaderMap, state: Arc<AppState>) -> Result<Uuid, Rejection> {
    let token = get_bearer_token(&header_map)?;
    Ok(validate_jwt(token, &state.config.jwt_secret)?)
}

pub fn get_bearer_token(header_map: &HeaderMap) -> Result<&str, Error> {
    let auth_header = match header_map.get(header::AUTHORIZATION) {
        Some(h) => std::str::from_utf8(h.as_bytes()).map_err(|_| Error::UtfEncodingError)?,
        None => return Err(Error::MissingAuthHeaderError),
    };

    match auth_header.strip_prefix(JWT_BEARER_PREFIX) {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(Error::InvalidAuthHeaderError),
    }
}

/// Validates signature, issuer and expiry of the token and returns the user id it was
/// issued for.
pub fn validate_jwt(token: &str, secret: &str) -> Result<Uuid, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[TOKEN_ISSUER]);
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);

    // fails if expired
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| Error::InvalidJwtError)?;

    Uuid::parse_str(&token_data.claims.sub).map_err(|_| Error::InvalidJwtError)
}
