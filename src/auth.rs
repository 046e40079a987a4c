use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::AppState;

const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: i64,
}

pub fn create_jwt(user: &User, secret: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        exp: (Utc::now() + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify_jwt(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Authenticated request context: the user row behind the bearer token.
pub struct AuthUser {
    pub user: User,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Unauthorized("Missing authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthorized("Invalid authorization header"))?;

        let claims = verify_jwt(token, &state.config.jwt_secret)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token"))?;

        let user = state
            .db
            .get_user_by_id(claims.sub)
            .await?
            .ok_or(AppError::Unauthorized("Unknown user"))?;

        if !user.is_active {
            return Err(AppError::Unauthorized("Inactive user"));
        }

        Ok(AuthUser { user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            password_hash: String::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn jwt_round_trip_preserves_identity() {
        let user = test_user();
        let token = create_jwt(&user, "test-secret").unwrap();
        let claims = verify_jwt(&token, "test-secret").unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, user.email);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn jwt_rejects_wrong_secret() {
        let token = create_jwt(&test_user(), "right-secret").unwrap();
        assert!(verify_jwt(&token, "wrong-secret").is_err());
    }

    #[test]
    fn jwt_rejects_garbage() {
        assert!(verify_jwt("not-a-token", "secret").is_err());
    }
}
