//! Admin change-request review endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;

use super::{success, ApiResult};
use crate::auth::Claims;
use crate::models::{ChangeRequest, ChangeStatus};
use crate::AppState;

/// GET /api/admin/requests - Pending change requests, oldest first.
pub async fn list_pending_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Vec<ChangeRequest>> {
    claims.require_admin()?;
    let requests = state
        .repo
        .list_requests_by_status(ChangeStatus::Pending)
        .await?;
    success(requests)
}

/// POST /api/admin/requests/{id}/approve - Apply a pending request.
pub async fn approve_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    claims.require_admin()?;
    state.review.approve(&id, &claims.username).await?;
    success(())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/admin/requests/{id}/reject - Reject a pending request.
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(body): Json<RejectRequest>,
) -> ApiResult<()> {
    claims.require_admin()?;
    state
        .review
        .reject(&id, body.reason.as_deref(), &claims.username)
        .await?;
    success(())
}
