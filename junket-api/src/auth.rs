use axum::{extract::State, routing::post, Extension, Json, Router};
use chrono::Utc;
use serde_json::Value;

use crate::{
    error::{ApiResponse, AppError},
    middleware::Claims,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/logout", post(logout))
}

/// Revokes the presented token until it would have expired anyway.
async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let ttl = claims.remaining_seconds(Utc::now().timestamp());
    state.denylist.revoke(&claims.jti, ttl).await?;

    tracing::info!(user_id = %claims.sub, jti = %claims.jti, ttl, "Token revoked");
    Ok(ApiResponse::ok("Logged out", Value::Null))
}
