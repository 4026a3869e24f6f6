use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local tables; data is lost on restart.
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    #[default]
    Duffel,
    Mock,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default)]
    pub mode: ProviderMode,
    #[serde(default = "default_provider_url")]
    pub base_url: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Offers whose `live_mode` differs from this are refused at hold time.
    #[serde(default)]
    pub live_mode: bool,
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
}

fn default_provider_url() -> String { "https://api.duffel.com".to_string() }
fn default_api_version() -> String { "v2".to_string() }
fn default_provider_timeout() -> u64 { 30 }

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    #[serde(default = "default_currency")]
    pub payment_currency: String,
    #[serde(default = "default_sweep_seconds")]
    pub expiry_sweep_seconds: u64,
    #[serde(default = "default_true")]
    pub compensate_failed_holds: bool,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            payment_currency: default_currency(),
            expiry_sweep_seconds: default_sweep_seconds(),
            compensate_failed_holds: true,
        }
    }
}

fn default_currency() -> String { "USD".to_string() }
fn default_sweep_seconds() -> u64 { 60 }
fn default_true() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: i64,
    pub window_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_seconds: 60,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `JUNKET__PROVIDER__ACCESS_TOKEN=duffel_test_...`
            .add_source(config::Environment::with_prefix("JUNKET").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = parse(
            r#"
            [server]
            port = 3000

            [database]
            url = "postgres://localhost/junket"

            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 3600

            [provider]
            access_token = "duffel_test_abc"
            "#,
        );

        assert_eq!(config.database.backend, StorageBackend::Postgres);
        assert_eq!(config.database.max_connections, 5);
        assert!(config.redis.is_none());
        assert!(config.kafka.is_none());
        assert_eq!(config.provider.mode, ProviderMode::Duffel);
        assert_eq!(config.provider.api_version, "v2");
        assert!(!config.provider.live_mode);
        assert_eq!(config.booking.payment_currency, "USD");
        assert!(config.booking.compensate_failed_holds);
        assert_eq!(config.rate_limit.requests_per_window, 100);
    }

    #[test]
    fn test_memory_backend_with_mock_provider() {
        let config = parse(
            r#"
            [server]
            port = 8080

            [database]
            backend = "memory"

            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 60

            [provider]
            mode = "mock"

            [booking]
            payment_currency = "EUR"
            expiry_sweep_seconds = 5
            compensate_failed_holds = false
            "#,
        );

        assert_eq!(config.database.backend, StorageBackend::Memory);
        assert_eq!(config.provider.mode, ProviderMode::Mock);
        assert_eq!(config.booking.payment_currency, "EUR");
        assert_eq!(config.booking.expiry_sweep_seconds, 5);
        assert!(!config.booking.compensate_failed_holds);
    }
}
