//! Self-service endpoints: a member's own profile and change-request
//! submission.

use axum::{extract::State, Extension, Json};
use validator::Validate;

use super::{success, ApiResult};
use crate::auth::Claims;
use crate::models::{ChangeRequest, Member, MemberPatch};
use crate::AppState;

/// GET /api/me - The caller's own profile.
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Member> {
    let login_key = claims.member_login_key()?;
    let member = state.members.get_by_email(login_key).await?;
    success(member)
}

/// PUT /api/me - Submit a profile update for admin review.
pub async fn submit_profile_update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(patch): Json<MemberPatch>,
) -> ApiResult<ChangeRequest> {
    patch.validate()?;

    let login_key = claims.member_login_key()?;
    let request = state.submission.submit_profile_update(login_key, patch).await?;
    success(request)
}

/// DELETE /api/me - Submit an account deletion request for admin review.
pub async fn submit_delete_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<ChangeRequest> {
    let login_key = claims.member_login_key()?;
    let request = state.submission.submit_delete_request(login_key).await?;
    success(request)
}
