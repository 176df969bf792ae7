//! Admin member management endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use validator::Validate;

use super::{success, ApiResult};
use crate::auth::Claims;
use crate::errors::AppError;
use crate::models::{
    CreateMemberRequest, Member, MemberFilter, PageResponse, UpdateMemberRequest,
};
use crate::services::csv_filename;
use crate::AppState;

/// GET /api/admin/members - Filtered, paged member search.
pub async fn search_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<MemberFilter>,
) -> ApiResult<PageResponse<Member>> {
    claims.require_admin()?;
    let page = state.query.search(&filter).await?;
    success(page)
}

/// POST /api/admin/members - Register a new member.
pub async fn create_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateMemberRequest>,
) -> ApiResult<Member> {
    claims.require_admin()?;
    request.validate()?;
    let member = state.members.register(request).await?;
    success(member)
}

/// GET /api/admin/members/{id} - Get a single member.
pub async fn get_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiResult<Member> {
    claims.require_admin()?;
    let member = state.members.get(&id).await?;
    success(member)
}

/// PUT /api/admin/members/{id} - Direct admin update.
pub async fn update_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(request): Json<UpdateMemberRequest>,
) -> ApiResult<Member> {
    claims.require_admin()?;
    request.validate()?;
    let member = state.members.update(&id, request).await?;
    success(member)
}

/// DELETE /api/admin/members/{id} - Direct admin delete.
pub async fn delete_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    claims.require_admin()?;
    state.members.delete(&id).await?;
    success(())
}

/// GET /api/admin/members/export - CSV download of the filtered member list.
pub async fn export_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<MemberFilter>,
) -> Result<Response, AppError> {
    claims.require_admin()?;
    let csv = state.export.export_csv(&filter).await?;

    let disposition = format!("attachment; filename=\"{}\"", csv_filename());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}
