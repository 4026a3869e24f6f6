use std::sync::Arc;

use junket_booking::BookingOrchestrator;
use junket_core::session::TokenDenylist;
use junket_store::app_config::RateLimitConfig;
use junket_store::RedisClient;

use crate::metrics::Metrics;
use crate::middleware::resiliency::ResiliencyState;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BookingOrchestrator>,
    pub denylist: Arc<dyn TokenDenylist>,
    /// Per-IP limiting is skipped when no Redis is configured.
    pub rate_limiter: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
    pub resiliency: Arc<ResiliencyState>,
    pub metrics: Arc<Metrics>,
}
