//! Authentication middleware for protected routes.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use classbank_core::{Actor, Role};
use classbank_shared::types::{TenantId, UserId};
use classbank_shared::{Claims, JwtError};
use tracing::debug;

use crate::AppState;
use crate::error::ApiError;

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
}

/// Builds the actor carried by verified claims.
fn actor_from_claims(claims: Claims) -> Result<Actor, ApiError> {
    let role: Role = claims.role.parse().map_err(|e: String| {
        debug!(error = %e, "Token carries an unknown role");
        ApiError::unauthorized("INVALID_TOKEN", "Token carries an unknown role")
    })?;
    Ok(Actor {
        user_id: UserId::from_uuid(claims.user_id()),
        tenant_id: TenantId::from_uuid(claims.tenant_id()),
        role,
        class_name: claims.class,
    })
}

/// Authentication middleware that validates JWT tokens.
///
/// This middleware:
/// 1. Extracts the Bearer token from the Authorization header
/// 2. Validates the token using the JWT service
/// 3. Stores the resulting [`Actor`] in request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let Some(token) = auth_header.and_then(extract_bearer_token) else {
        return ApiError::unauthorized(
            "MISSING_TOKEN",
            "Authorization header with Bearer token is required",
        )
        .into_response();
    };

    let claims = match state.jwt_service.validate_token(token) {
        Ok(claims) => claims,
        Err(JwtError::Expired) => {
            return ApiError::unauthorized("TOKEN_EXPIRED", "Token has expired").into_response();
        }
        Err(_) => {
            return ApiError::unauthorized("INVALID_TOKEN", "Invalid or malformed token")
                .into_response();
        }
    };

    match actor_from_claims(claims) {
        Ok(actor) => {
            request.extensions_mut().insert(actor);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Extractor for the authenticated caller.
///
/// ```ignore
/// async fn handler(CurrentActor(actor): CurrentActor) -> impl IntoResponse {
///     let tenant = actor.tenant_id;
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

impl CurrentActor {
    /// Fails unless the caller is a teacher or admin.
    pub fn require_staff(&self) -> Result<&Actor, ApiError> {
        if self.0.is_staff() {
            Ok(&self.0)
        } else {
            Err(ApiError::forbidden("teacher role required"))
        }
    }
}

impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Actor>()
            .cloned()
            .map(CurrentActor)
            .ok_or_else(|| ApiError::unauthorized("UNAUTHORIZED", "Authentication required"))
    }
}
