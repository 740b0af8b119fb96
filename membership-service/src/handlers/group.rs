use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{CreateGroupRequest, CreateInviteRequest, RoleResponse},
    middleware::AuthUser,
    models::{GroupId, GroupResponse, InviteResponse},
    utils::ValidatedJson,
    AppState,
};

#[tracing::instrument(skip_all)]
pub async fn create_group(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let group = state
        .core
        .create_group(owner_id, &req.name, req.description)
        .await?;

    Ok((StatusCode::CREATED, Json(GroupResponse::from(group))))
}

#[tracing::instrument(skip_all)]
pub async fn create_invite(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(group_id): Path<GroupId>,
    ValidatedJson(req): ValidatedJson<CreateInviteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invite = state
        .core
        .create_invite(actor, group_id, &req.role, req.max_uses)
        .await?;

    Ok((StatusCode::CREATED, Json(InviteResponse::from(invite))))
}

/// The caller's effective role in a group.
pub async fn get_role(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(group_id): Path<GroupId>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.core.resolve_role(user_id, group_id).await?;
    Ok(Json(RoleResponse { group_id, role }))
}
