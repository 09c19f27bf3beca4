//! Authentication: `userid` header plus HS256 bearer token.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{codes, ApiError};
use crate::state::AppState;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time
    pub exp: i64,
    /// Issued at
    pub iat: i64,
}

/// Generate a bearer token for a user. Sessions last 24 hours.
pub fn generate_jwt(secret: &str, user_id: i64) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + Duration::hours(24)).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| ApiError::internal(format!("failed to generate JWT: {}", e)))
}

/// Validate a bearer token.
pub fn validate_jwt(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| ApiError::unauthorized(codes::BAD_AUTH, format!("invalid token: {}", e)))
}

/// Authenticated caller, extracted from the `userid` header and the
/// matching bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let state = parts
            .extensions
            .get::<Arc<AppState>>()
            .cloned()
            .ok_or_else(|| ApiError::internal("application state missing"))?;

        let user_id: i64 = parts
            .headers
            .get("userid")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ApiError::bad_request(codes::MISSING_USER_HEADER, "missing userid header")
            })?
            .parse()
            .map_err(|_| {
                ApiError::bad_request(codes::MALFORMED_REQUEST, "userid header must be numeric")
            })?;

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                ApiError::unauthorized(codes::BAD_AUTH, "missing bearer token")
            })?;

        let claims = validate_jwt(&state.config.jwt_secret, token)?;
        if claims.sub != user_id.to_string() {
            return Err(ApiError::unauthorized(
                codes::BAD_AUTH,
                "token subject does not match userid header",
            ));
        }
        Ok(AuthUser { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_round_trip() {
        let token = generate_jwt("secret", 1006).unwrap();
        let claims = validate_jwt("secret", &token).unwrap();
        assert_eq!(claims.sub, "1006");
        assert!(validate_jwt("other-secret", &token).is_err());
        assert!(validate_jwt("secret", "garbage").is_err());
    }
}
