//! Authentication endpoints: login, password change, admin bootstrap.

use axum::{extract::State, http::HeaderMap, Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{success, ApiResult};
use crate::auth::{self, Claims, SETUP_KEY_HEADER};
use crate::errors::AppError;
use crate::models::{Role, UserAccount};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub role: Role,
    pub must_change_password: bool,
}

/// POST /api/auth/login - Exchange credentials for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    request.validate()?;

    let user_name = request.email.trim().to_lowercase();
    let user = state
        .repo
        .find_user_by_user_name(&user_name)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    if !auth::verify_password(&request.password, &user.password_hash)? {
        return Err(AppError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    let token = auth::issue_token(
        &state.config.jwt_secret,
        state.config.jwt_ttl_minutes,
        &user.id,
        &user.user_name,
        user.role,
        user.member_id.clone(),
    )?;

    success(LoginResponse {
        token,
        role: user.role,
        must_change_password: user.must_change_password,
    })
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

/// POST /api/auth/password - Change the caller's password and clear the
/// must-change flag.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<()> {
    request.validate()?;

    let user = state
        .repo
        .find_user_by_user_name(&claims.username)
        .await?
        .ok_or_else(|| AppError::NotFound("User login not found".to_string()))?;

    if !auth::verify_password(&request.current_password, &user.password_hash)? {
        return Err(AppError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    let hash = auth::hash_password(&request.new_password)?;
    state.repo.update_user_password(&user.id, &hash, false).await?;

    success(())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// POST /api/admin/users - Create an admin login, guarded by the pre-shared
/// setup key.
pub async fn create_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateAdminRequest>,
) -> ApiResult<UserAccount> {
    let Some(expected) = state.config.setup_key.as_deref() else {
        return Err(AppError::Forbidden(
            "Admin bootstrap is disabled".to_string(),
        ));
    };

    let provided = headers
        .get(SETUP_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !auth::constant_time_compare(provided, expected) {
        return Err(AppError::Unauthorized("Invalid setup key".to_string()));
    }

    request.validate()?;

    let user = UserAccount {
        id: uuid::Uuid::new_v4().to_string(),
        user_name: request.email.trim().to_lowercase(),
        password_hash: auth::hash_password(&request.password)?,
        role: Role::Admin,
        must_change_password: false,
        member_id: None,
    };
    state.repo.insert_user(&user).await?;

    tracing::info!("admin account created: {}", user.user_name);
    success(user)
}
