use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("Session store error: {0}")]
pub struct SessionStoreError(pub String);

/// Revoked token IDs, each kept until the token would have expired anyway.
#[async_trait]
pub trait TokenDenylist: Send + Sync {
    async fn revoke(&self, jti: &str, ttl_seconds: u64) -> Result<(), SessionStoreError>;

    async fn is_revoked(&self, jti: &str) -> Result<bool, SessionStoreError>;
}
