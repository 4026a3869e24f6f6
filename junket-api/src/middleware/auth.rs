use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use junket_core::directory::RoleSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User ID.
    pub sub: Uuid,
    /// Token ID, the denylist key.
    pub jti: String,
    pub exp: usize,
}

impl Claims {
    /// Seconds until the token expires, at least one.
    pub fn remaining_seconds(&self, now: i64) -> u64 {
        (self.exp as i64 - now).max(1) as u64
    }
}

// ============================================================================
// Authentication Middleware
// ============================================================================

pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    // 1. Bearer token
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    // 2. Signature and expiry
    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "Rejected token");
        AppError::AuthenticationError("Invalid token".to_string())
    })?;

    // 3. Revocation
    if state.denylist.is_revoked(&token_data.claims.jti).await? {
        return Err(AppError::AuthenticationError("Token has been revoked".to_string()));
    }

    // 4. Inject claims
    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}

// ============================================================================
// Event Role Checks
// ============================================================================

pub async fn event_roles(state: &AppState, claims: &Claims, event_id: Uuid) -> Result<RoleSet, AppError> {
    Ok(state.orchestrator.directory().event_roles(claims.sub, event_id).await?)
}

/// Event planners and finance staff may act on any itinerary of the event.
pub async fn require_travel_manager(state: &AppState, claims: &Claims, event_id: Uuid) -> Result<RoleSet, AppError> {
    let roles = event_roles(state, claims, event_id).await?;
    if !roles.can_manage_travel() {
        return Err(AppError::AuthorizationError(
            "Event planner or finance role required".to_string(),
        ));
    }
    Ok(roles)
}

pub async fn require_finance(state: &AppState, claims: &Claims, event_id: Uuid) -> Result<RoleSet, AppError> {
    let roles = event_roles(state, claims, event_id).await?;
    if !roles.can_view_finance() {
        return Err(AppError::AuthorizationError("Finance role required".to_string()));
    }
    Ok(roles)
}
