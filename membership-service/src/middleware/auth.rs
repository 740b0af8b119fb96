use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::models::UserId;
use crate::AppState;

const UNAUTHENTICATED: &str = "Missing or invalid credentials";

/// The user a request was authenticated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

/// Middleware to require authentication.
///
/// Resolves the bearer token and stores the owner in request extensions. Every
/// failure is the same 401; the request never reaches the handler.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::unauthorized(UNAUTHENTICATED))?;

    let user_id = state.core.resolve_token(token).await.map_err(|e| {
        tracing::debug!(kind = ?e.kind(), "Bearer token rejected");
        AppError::unauthorized(UNAUTHENTICATED)
    })?;

    req.extensions_mut().insert(AuthenticatedUser(user_id));

    Ok(next.run(req).await)
}

/// Extractor to easily get the authenticated user in handlers
pub struct AuthUser(pub UserId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(user_id) = parts
            .extensions
            .get::<AuthenticatedUser>()
            .copied()
            .ok_or_else(|| AppError::unauthorized(UNAUTHENTICATED))?;

        Ok(AuthUser(user_id))
    }
}
