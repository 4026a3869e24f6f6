use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use junket_booking::SearchResult;
use junket_core::itinerary::ItineraryDetail;
use junket_core::provider::{Offer, OfferPage, OfferPageRequest, OfferSearch, PassengerDetails};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{ApiResponse, AppError},
    middleware::Claims,
    state::AppState,
};

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(flatten)]
    pub search: OfferSearch,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct OffersQuery {
    pub offer_request_id: String,
    pub limit: Option<u32>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HoldRequest {
    pub offer_id: String,
    pub passengers: Vec<PassengerDetails>,
}

fn page_size(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// Routes that reach the flight provider; wrapped by the circuit breaker.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/events/{event_id}/flights/search", post(search_flights))
        .route("/v1/events/{event_id}/flights/hold", post(hold_flight))
        .route("/v1/flights/offers", get(list_offers))
        .route("/v1/flights/offers/{offer_id}", get(get_offer))
}

/// POST /v1/events/{event_id}/flights/search
async fn search_flights(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<Uuid>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<ApiResponse<SearchResult>>, AppError> {
    let result = state
        .orchestrator
        .search_flights(claims.sub, event_id, &req.search, page_size(req.limit))
        .await;
    state.metrics.observe("search", &result);

    Ok(ApiResponse::ok("Offers retrieved", result?))
}

/// GET /v1/flights/offers?offer_request_id=..&after=..
async fn list_offers(
    State(state): State<AppState>,
    Query(query): Query<OffersQuery>,
) -> Result<Json<ApiResponse<OfferPage>>, AppError> {
    let page = state
        .orchestrator
        .list_offers(&OfferPageRequest {
            offer_request_id: query.offer_request_id,
            limit: page_size(query.limit),
            after: query.after,
            before: query.before,
        })
        .await?;

    Ok(ApiResponse::ok("Offers retrieved", page))
}

/// GET /v1/flights/offers/{offer_id}
async fn get_offer(
    State(state): State<AppState>,
    Path(offer_id): Path<String>,
) -> Result<Json<ApiResponse<Offer>>, AppError> {
    let offer = state.orchestrator.get_offer(&offer_id).await?;
    Ok(ApiResponse::ok("Offer retrieved", offer))
}

/// POST /v1/events/{event_id}/flights/hold
async fn hold_flight(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<Uuid>,
    Json(req): Json<HoldRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ItineraryDetail>>), AppError> {
    if req.passengers.is_empty() {
        return Err(AppError::ValidationError("At least one passenger is required".to_string()));
    }

    let result = state
        .orchestrator
        .hold(claims.sub, event_id, &req.offer_id, req.passengers)
        .await;
    state.metrics.observe("hold", &result);

    Ok((StatusCode::CREATED, ApiResponse::ok("Flight held", result?)))
}
