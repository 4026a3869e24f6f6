use async_trait::async_trait;
use junket_core::events::{EventPublisher, PublishError};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl EventPublisher for EventProducer {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(topic, key, partition = delivery.partition, offset = delivery.offset, "Event published");
                Ok(())
            }
            Err((e, _msg)) => {
                error!(topic, key, error = %e, "Failed to publish event");
                Err(PublishError {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Stand-in when no brokers are configured: events go to the log only.
#[derive(Clone, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
        info!(topic, key, payload, "Event (not published, no Kafka configured)");
        Ok(())
    }
}
