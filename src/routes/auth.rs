use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use std::sync::Arc;

use crate::auth::{create_jwt, AuthUser};
use crate::error::AppError;
use crate::models::{CreateUser, TokenRequest, TokenResponse, UserResponse};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/token", post(token))
        .route("/me", get(me))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = CreateUser,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid email or duplicate registration"),
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUser>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    if !payload.email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }
    if payload.password.len() < 8 {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let password_hash = bcrypt::hash(&payload.password, bcrypt::DEFAULT_COST)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;

    let user = match state.db.create_user(&payload.email, &password_hash).await {
        Ok(user) => user,
        Err(e) if e.to_string().contains("users_email_key") => {
            return Err(AppError::BadRequest("Email already registered".to_string()));
        }
        Err(e) => return Err(AppError::Internal(e)),
    };

    tracing::info!("Registered user {} ({})", user.id, user.email);
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    post,
    path = "/api/auth/token",
    tag = "auth",
    responses(
        (status = 200, description = "Bearer token issued", body = TokenResponse),
        (status = 401, description = "Bad credentials"),
    )
)]
pub async fn token(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = state
        .db
        .get_user_by_email(&payload.username)
        .await?
        .ok_or(AppError::Unauthorized("Incorrect email or password"))?;

    // provider-provisioned accounts have no local password
    if user.password_hash.is_empty() {
        return Err(AppError::Unauthorized("Incorrect email or password"));
    }

    let valid = bcrypt::verify(&payload.password, &user.password_hash)
        .map_err(|e| anyhow::anyhow!("Failed to verify password: {}", e))?;
    if !valid {
        return Err(AppError::Unauthorized("Incorrect email or password"));
    }
    if !user.is_active {
        return Err(AppError::Unauthorized("Inactive user"));
    }

    let access_token = create_jwt(&user, &state.config.jwt_secret)?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated"),
    )
)]
pub async fn me(auth: AuthUser) -> Json<UserResponse> {
    Json(auth.user.into())
}
