use async_trait::async_trait;
use junket_core::session::{SessionStoreError, TokenDenylist};
use redis::{AsyncCommands, RedisResult};
use tracing::info;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter; `true` while the key is within `limit`.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

fn revoked_key(jti: &str) -> String {
    format!("auth:revoked:{}", jti)
}

#[async_trait]
impl TokenDenylist for RedisClient {
    async fn revoke(&self, jti: &str, ttl_seconds: u64) -> Result<(), SessionStoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SessionStoreError(e.to_string()))?;

        conn.set_ex::<_, _, ()>(revoked_key(jti), 1, ttl_seconds.max(1))
            .await
            .map_err(|e| SessionStoreError(e.to_string()))?;

        info!(jti, ttl_seconds, "Token revoked");
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, SessionStoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SessionStoreError(e.to_string()))?;

        conn.exists(revoked_key(jti))
            .await
            .map_err(|e| SessionStoreError(e.to_string()))
    }
}
