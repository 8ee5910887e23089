//! Payment event publisher
//!
//! Publishes outcome events to NATS JetStream with bounded exponential
//! retry. The subject is the event's routing key (`payment.succeeded`,
//! `payment.failed`, `payment.refunded`), all captured by one persistent
//! stream. Delivery is at-least-once; consumers deduplicate.

use std::time::Duration;

use async_nats::jetstream::{
    self,
    stream::{Config as StreamConfig, StorageType},
    Context as JetStreamContext,
};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{error, info, warn};

use domain_payment::events::{EventError, EventPublisher, PaymentEvent};

use crate::error::BusError;

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// JetStream stream holding payment events
    pub stream_name: String,
    /// Max publish attempts per event
    pub max_retry_attempts: u32,
    /// Initial retry delay
    pub initial_retry_delay: Duration,
    /// Max retry delay
    pub max_retry_delay: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            stream_name: "payment_events".to_string(),
            max_retry_attempts: 3,
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(2),
        }
    }
}

/// JetStream-backed implementation of the `EventPublisher` port
pub struct NatsEventPublisher {
    context: JetStreamContext,
    config: PublisherConfig,
}

impl NatsEventPublisher {
    /// Connects to NATS and ensures the payment event stream exists
    pub async fn connect(nats_url: &str, config: PublisherConfig) -> Result<Self, BusError> {
        info!("Connecting event publisher to NATS at {}", nats_url);

        let client = async_nats::connect(nats_url)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        let context = jetstream::new(client);

        let publisher = Self { context, config };
        publisher.ensure_stream().await?;
        Ok(publisher)
    }

    async fn ensure_stream(&self) -> Result<(), BusError> {
        let config = StreamConfig {
            name: self.config.stream_name.clone(),
            description: Some("Payment outcome events".to_string()),
            subjects: vec!["payment.>".to_string()],
            storage: StorageType::File,
            ..Default::default()
        };

        self.context
            .get_or_create_stream(config)
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;
        Ok(())
    }

    /// Publishes with exponential backoff retry
    async fn publish_with_retry(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        let mut attempts = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            attempts += 1;

            match self.publish_once(subject, payload.clone()).await {
                Ok(()) => {
                    if attempts > 1 {
                        info!("Event published after {} attempts", attempts);
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempts >= self.config.max_retry_attempts {
                        error!("Failed to publish after {} attempts: {}", attempts, e);
                        return Err(e);
                    }

                    warn!(
                        "Publish failed (attempt {}), retrying in {:?}: {}",
                        attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;

                    // Exponential backoff
                    delay = (delay * 2).min(self.config.max_retry_delay);
                }
            }
        }
    }

    async fn publish_once(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        let ack = self
            .context
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        // Wait for the broker to confirm persistence.
        ack.await
            .map_err(|e| BusError::Publish(format!("Publish ack failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for NatsEventPublisher {
    async fn publish(&self, event: &PaymentEvent) -> Result<(), EventError> {
        let subject = event.event_type();
        let payload = serde_json::to_vec(&event.envelope())
            .map_err(|e| EventError::Serialization(e.to_string()))?;

        self.publish_with_retry(subject, Bytes::from(payload))
            .await
            .map_err(|e| match e {
                BusError::Connection(msg) => EventError::ConnectionFailed(msg),
                other => EventError::PublishFailed(other.to_string()),
            })
    }
}
