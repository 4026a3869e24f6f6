pub mod app_config;
pub mod database;
pub mod directory_repo;
pub mod events;
pub mod itinerary_repo;
pub mod memory;
pub mod redis_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use directory_repo::PgDirectoryRepository;
pub use events::{EventProducer, LogPublisher};
pub use itinerary_repo::PgItineraryStore;
pub use memory::{FaultPlan, MemoryDenylist, MemoryDirectory, MemoryItineraryStore, RecordingPublisher};
pub use redis_repo::RedisClient;
