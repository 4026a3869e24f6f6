use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::{error::AppError, state::AppState};

pub struct Metrics {
    registry: Registry,
    booking_operations: IntCounterVec,
    holds_lapsed: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("junket".to_string()), None)?;

        let booking_operations = IntCounterVec::new(
            Opts::new("booking_operations_total", "Booking operations by outcome"),
            &["operation", "outcome"],
        )?;
        let holds_lapsed = IntCounter::new("holds_lapsed_total", "Unpaid holds lapsed by the expiry sweep")?;

        registry.register(Box::new(booking_operations.clone()))?;
        registry.register(Box::new(holds_lapsed.clone()))?;

        Ok(Self {
            registry,
            booking_operations,
            holds_lapsed,
        })
    }

    /// Counts one orchestrator call; failures are labelled with the error kind.
    pub fn observe<T>(&self, operation: &str, result: &Result<T, junket_booking::BookingError>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        self.booking_operations.with_label_values(&[operation, outcome]).inc();
    }

    pub fn add_lapsed(&self, count: usize) {
        self.holds_lapsed.inc_by(count as u64);
    }

    pub fn render(&self) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| AppError::InternalServerError(format!("metrics encoding failed: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| AppError::InternalServerError(e.to_string()))
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics))
}

async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
