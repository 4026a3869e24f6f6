use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error;
pub mod finance;
pub mod flights;
pub mod itineraries;
pub mod metrics;
pub mod middleware;
pub mod state;
pub mod worker;

pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let provider_facing = flights::routes()
        .merge(itineraries::provider_routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::circuit_breaker_middleware));

    let authenticated = provider_facing
        .merge(itineraries::routes())
        .merge(finance::routes())
        .merge(auth::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(metrics::routes())
        .merge(authenticated)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "success": true, "message": "ok" }))
}

async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (Some(limiter), Some(ConnectInfo(addr))) = (
        state.rate_limiter.as_ref(),
        req.extensions().get::<ConnectInfo<SocketAddr>>().copied(),
    ) else {
        return next.run(req).await;
    };

    let key = format!("ratelimit:{}", addr.ip());
    match limiter
        .check_rate_limit(&key, state.rate_limit.requests_per_window, state.rate_limit.window_seconds)
        .await
    {
        Ok(true) => next.run(req).await,
        Ok(false) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "success": false, "message": "Rate limit exceeded" })),
        )
            .into_response(),
        Err(e) => {
            // Fail open
            tracing::warn!(error = %e, "Rate limit check failed");
            next.run(req).await
        }
    }
}
