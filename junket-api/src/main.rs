use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use junket_api::middleware::resiliency::ResiliencyState;
use junket_api::{app, metrics::Metrics, worker, AppState, AuthConfig};
use junket_booking::{BookingOrchestrator, BookingSettings};
use junket_core::events::EventPublisher;
use junket_core::provider::FlightProvider;
use junket_core::repository::{DirectoryRepository, ItineraryStore};
use junket_core::session::TokenDenylist;
use junket_duffel::{DuffelClient, DuffelConfig, MockProvider};
use junket_store::app_config::{Config, ProviderMode, StorageBackend};
use junket_store::{
    DbClient, EventProducer, LogPublisher, MemoryDenylist, MemoryDirectory, MemoryItineraryStore,
    PgDirectoryRepository, PgItineraryStore, RedisClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "junket_api=debug,junket_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Junket API on port {}", config.server.port);

    // Itinerary store and directory
    let (itineraries, directory): (Arc<dyn ItineraryStore>, Arc<dyn DirectoryRepository>) =
        match config.database.backend {
            StorageBackend::Postgres => {
                let db = DbClient::new(&config.database.url, config.database.max_connections)
                    .await
                    .context("Failed to connect to Postgres")?;
                db.migrate().await.context("Failed to run migrations")?;
                (
                    Arc::new(PgItineraryStore::new(db.pool.clone())),
                    Arc::new(PgDirectoryRepository::new(db.pool.clone())),
                )
            }
            StorageBackend::Memory => {
                tracing::warn!("Using the in-memory store; data is lost on restart");
                let directory = Arc::new(MemoryDirectory::new());
                (Arc::new(MemoryItineraryStore::new(directory.clone())), directory)
            }
        };

    // Redis: token denylist and rate limiting
    let (denylist, rate_limiter): (Arc<dyn TokenDenylist>, Option<Arc<RedisClient>>) = match &config.redis {
        Some(redis) => {
            let client = Arc::new(
                RedisClient::new(&redis.url)
                    .await
                    .context("Failed to connect to Redis")?,
            );
            (client.clone(), Some(client))
        }
        None => {
            tracing::warn!("No Redis configured; revoked tokens are kept in memory and rate limiting is off");
            (Arc::new(MemoryDenylist::new()), None)
        }
    };

    // Kafka
    let events: Arc<dyn EventPublisher> = match &config.kafka {
        Some(kafka) => Arc::new(EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?),
        None => Arc::new(LogPublisher),
    };

    // Flight provider
    let provider: Arc<dyn FlightProvider> = match config.provider.mode {
        ProviderMode::Duffel => Arc::new(
            DuffelClient::new(DuffelConfig {
                base_url: config.provider.base_url.clone(),
                access_token: config.provider.access_token.clone(),
                api_version: config.provider.api_version.clone(),
                timeout: Duration::from_secs(config.provider.timeout_seconds),
            })
            .context("Failed to build Duffel client")?,
        ),
        ProviderMode::Mock => {
            tracing::warn!("Using the scripted mock flight provider");
            Arc::new(MockProvider::new())
        }
    };

    let orchestrator = Arc::new(BookingOrchestrator::new(
        provider,
        itineraries,
        directory,
        events,
        BookingSettings {
            payment_currency: config.booking.payment_currency.clone(),
            live_mode: config.provider.live_mode,
            compensate_failed_holds: config.booking.compensate_failed_holds,
        },
    ));
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    worker::start_expiry_worker(
        orchestrator.clone(),
        metrics.clone(),
        Duration::from_secs(config.booking.expiry_sweep_seconds.max(1)),
    );

    let app_state = AppState {
        orchestrator,
        denylist,
        rate_limiter,
        rate_limit: config.rate_limit.clone(),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        resiliency: Arc::new(ResiliencyState::default()),
        metrics,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
