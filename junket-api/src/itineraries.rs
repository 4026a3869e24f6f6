use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use junket_booking::BookingError;
use junket_core::itinerary::{Itinerary, ItineraryDetail};
use uuid::Uuid;

use crate::{
    error::{ApiResponse, AppError},
    middleware::auth::{require_travel_manager, Claims},
    state::AppState,
};

/// Routes that never reach the provider.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/events/{event_id}/itineraries", get(list_for_event))
        .route("/v1/itineraries/{id}", get(get_itinerary))
        .route("/v1/itineraries/{id}/decline", post(decline))
}

/// Routes that move money or cancel with the provider.
pub fn provider_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/itineraries/orders/{order_id}/pay", post(pay))
        .route("/v1/itineraries/{id}/cancel", post(cancel))
}

async fn load(state: &AppState, id: Uuid) -> Result<Itinerary, AppError> {
    state
        .orchestrator
        .itineraries()
        .find_by_id(id)
        .await?
        .ok_or_else(|| BookingError::ItineraryNotFound(id.to_string()).into())
}

/// GET /v1/events/{event_id}/itineraries
async fn list_for_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Itinerary>>>, AppError> {
    require_travel_manager(&state, &claims, event_id).await?;
    let itineraries = state.orchestrator.itineraries().list_for_event(event_id).await?;
    Ok(ApiResponse::ok("Itineraries retrieved", itineraries))
}

/// GET /v1/itineraries/{id}
/// The booking attendee sees their own itinerary; staff see any in their event.
async fn get_itinerary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ItineraryDetail>>, AppError> {
    let detail = state.orchestrator.itinerary_detail(id).await?;
    let itinerary = &detail.itinerary;

    let own = state
        .orchestrator
        .directory()
        .find_attendee(claims.sub, itinerary.event_id)
        .await?
        .is_some_and(|attendee| attendee.id == itinerary.attendee_id);
    if !own {
        require_travel_manager(&state, &claims, itinerary.event_id).await?;
    }

    Ok(ApiResponse::ok("Itinerary retrieved", detail))
}

/// POST /v1/itineraries/orders/{order_id}/pay
async fn pay(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<Itinerary>>, AppError> {
    let itinerary = state
        .orchestrator
        .itineraries()
        .find_by_order_id(&order_id)
        .await?
        .ok_or_else(|| BookingError::ItineraryNotFound(order_id.clone()))?;
    require_travel_manager(&state, &claims, itinerary.event_id).await?;

    let result = state.orchestrator.pay(&order_id).await;
    state.metrics.observe("pay", &result);

    Ok(ApiResponse::ok("Flight approved", result?))
}

/// POST /v1/itineraries/{id}/decline
async fn decline(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Itinerary>>, AppError> {
    let itinerary = load(&state, id).await?;
    require_travel_manager(&state, &claims, itinerary.event_id).await?;

    let result = state.orchestrator.decline_pending_flight(id).await;
    state.metrics.observe("decline", &result);

    Ok(ApiResponse::ok("Flight declined", result?))
}

/// POST /v1/itineraries/{id}/cancel
async fn cancel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Itinerary>>, AppError> {
    let itinerary = load(&state, id).await?;
    require_travel_manager(&state, &claims, itinerary.event_id).await?;

    let result = state.orchestrator.cancel_approved_flight(id).await;
    state.metrics.observe("cancel", &result);

    Ok(ApiResponse::ok("Flight cancelled", result?))
}
