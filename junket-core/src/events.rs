use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("Failed to publish to {topic}: {reason}")]
pub struct PublishError {
    pub topic: String,
    pub reason: String,
}

/// Outbound domain events. Publishing happens after the local commit, so
/// a failure here never undoes a state change.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError>;
}
