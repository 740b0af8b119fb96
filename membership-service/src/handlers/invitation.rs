use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;

use crate::{
    dtos::RedeemResponse,
    middleware::AuthUser,
    models::{GroupId, InviteId},
    AppState,
};

#[tracing::instrument(skip_all)]
pub async fn redeem_invite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(invite_id): Path<InviteId>,
) -> Result<impl IntoResponse, AppError> {
    let membership = state.core.redeem_invite(invite_id, user_id).await?;
    let role = state
        .core
        .resolve_role(membership.user_id, membership.group_id)
        .await?;

    Ok(Json(RedeemResponse {
        user_id: membership.user_id,
        group_id: membership.group_id,
        role,
    }))
}

#[derive(Debug, Deserialize)]
pub struct InviteCheckQuery {
    pub group_id: GroupId,
}

/// Whether an invite is still usable for the given group.
pub async fn check_invite(
    State(state): State<AppState>,
    Path(invite_id): Path<InviteId>,
    Query(query): Query<InviteCheckQuery>,
) -> Result<impl IntoResponse, AppError> {
    let valid = state.core.invite_exists(invite_id, query.group_id).await?;
    Ok(Json(serde_json::json!({ "invite_id": invite_id, "valid": valid })))
}
