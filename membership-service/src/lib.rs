pub mod clock;
pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::{request_id_middleware, REQUEST_ID_HEADER};
use tower_http::trace::TraceLayer;

use crate::config::MembershipConfig;
use crate::services::MembershipCore;

#[derive(Clone)]
pub struct AppState {
    pub config: MembershipConfig,
    pub core: MembershipCore,
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/users/me",
            get(handlers::user::get_me).delete(handlers::user::delete_me),
        )
        .route("/users/me/api-keys", post(handlers::user::create_api_key))
        .route("/groups", post(handlers::group::create_group))
        .route(
            "/groups/:group_id/invites",
            post(handlers::group::create_invite),
        )
        .route("/groups/:group_id/role", get(handlers::group::get_role))
        .route("/invites/:invite_id", get(handlers::invitation::check_invite))
        .route(
            "/invites/:invite_id/redeem",
            post(handlers::invitation::redeem_invite),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/token", post(handlers::auth::token))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
}

/// Service health check
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.core.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "store": format!("{:?}", state.config.store.backend),
    })))
}
