//! Order-cancellation consumer loop
//!
//! Durable JetStream pull consumer bound to `order.cancelled`, one
//! message in flight at a time. Each delivery is handed to the
//! cancellation reactor; the message is acknowledged when the reactor
//! returns, nak'd for redelivery when it reports an infrastructure
//! failure, and terminated when the payload cannot be parsed.

use std::time::Duration;

use async_nats::jetstream::{
    self,
    consumer::{self, AckPolicy, DeliverPolicy},
    stream::{Config as StreamConfig, StorageType},
    Context as JetStreamContext,
};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{error, info, warn};

use domain_payment::cancellation::CancellationReactor;
use domain_payment::events::{OrderCancelled, ORDER_CANCELLED_ROUTING_KEY};
use domain_payment::store::PaymentStore;

use crate::error::BusError;

/// Consumer configuration
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// JetStream stream holding order events
    pub stream_name: String,
    /// Durable consumer name
    pub durable_name: String,
    /// Acknowledgment wait time before redelivery
    pub ack_wait: Duration,
    /// Max delivery attempts per message
    pub max_deliver: i64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            stream_name: "order_events".to_string(),
            durable_name: "payment-service-cancellations".to_string(),
            ack_wait: Duration::from_secs(30),
            max_deliver: 5,
        }
    }
}

/// Envelope the order service wraps its events in
#[derive(Debug, Deserialize)]
struct OrderEventEnvelope {
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Long-lived consumer feeding `order.cancelled` events to the reactor
pub struct CancellationConsumer<S: PaymentStore> {
    context: JetStreamContext,
    reactor: CancellationReactor<S>,
    config: ConsumerConfig,
}

impl<S: PaymentStore> CancellationConsumer<S> {
    /// Connects to NATS and ensures the order event stream exists
    pub async fn connect(
        nats_url: &str,
        reactor: CancellationReactor<S>,
        config: ConsumerConfig,
    ) -> Result<Self, BusError> {
        info!("Connecting cancellation consumer to NATS at {}", nats_url);

        let client = async_nats::connect(nats_url)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        let context = jetstream::new(client);

        let consumer = Self {
            context,
            reactor,
            config,
        };
        consumer.ensure_stream().await?;
        Ok(consumer)
    }

    async fn ensure_stream(&self) -> Result<(), BusError> {
        let config = StreamConfig {
            name: self.config.stream_name.clone(),
            description: Some("Order lifecycle events".to_string()),
            subjects: vec!["order.>".to_string()],
            storage: StorageType::File,
            ..Default::default()
        };

        self.context
            .get_or_create_stream(config)
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;
        Ok(())
    }

    /// Consumes cancellation events until the subscription ends
    pub async fn run(&self) -> Result<(), BusError> {
        let consumer_config = consumer::pull::Config {
            durable_name: Some(self.config.durable_name.clone()),
            filter_subject: ORDER_CANCELLED_ROUTING_KEY.to_string(),
            ack_policy: AckPolicy::Explicit,
            ack_wait: self.config.ack_wait,
            max_deliver: self.config.max_deliver,
            deliver_policy: DeliverPolicy::All,
            // One message in flight per consumer instance.
            max_ack_pending: 1,
            ..Default::default()
        };

        let consumer = self
            .context
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?
            .create_consumer(consumer_config)
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        info!(
            stream = %self.config.stream_name,
            durable = %self.config.durable_name,
            "Consuming order cancellation events"
        );

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        while let Some(message) = messages.next().await {
            let message = message.map_err(|e| BusError::Subscribe(e.to_string()))?;
            self.handle_delivery(message).await;
        }

        Ok(())
    }

    async fn handle_delivery(&self, message: jetstream::Message) {
        let event = match parse_cancellation(&message.payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                // Not a cancellation; this consumer filters on the
                // routing key, but the envelope wins on disagreement.
                if let Err(e) = message.ack().await {
                    error!("Failed to ack non-cancellation event: {}", e);
                }
                return;
            }
            Err(e) => {
                error!("Failed to parse order event: {}", e);
                // Malformed payload will never parse; drop it.
                if let Err(term_err) = message.ack_with(jetstream::AckKind::Term).await {
                    error!("Failed to terminate bad message: {}", term_err);
                }
                return;
            }
        };

        match self.reactor.handle_order_cancelled(&event).await {
            Ok(summary) => {
                info!(
                    order_id = %event.order_id,
                    refunded = summary.refunded,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "Order cancellation processed"
                );
                if let Err(e) = message.ack().await {
                    error!("Failed to ack cancellation event: {}", e);
                }
            }
            Err(e) => {
                warn!(
                    order_id = %event.order_id,
                    error = %e,
                    "Cancellation processing failed; requesting redelivery"
                );
                if let Err(nak_err) = message.ack_with(jetstream::AckKind::Nak(None)).await {
                    error!("Failed to nak cancellation event: {}", nak_err);
                }
            }
        }
    }
}

/// Extracts an `OrderCancelled` from a raw delivery
///
/// Accepts both the enveloped form `{event_type, timestamp, data}` and a
/// bare `{order_id}` payload. Returns `Ok(None)` for envelopes of a
/// different event type.
fn parse_cancellation(payload: &[u8]) -> Result<Option<OrderCancelled>, BusError> {
    if let Ok(envelope) = serde_json::from_slice::<OrderEventEnvelope>(payload) {
        if !envelope.event_type.is_empty() {
            if envelope.event_type != ORDER_CANCELLED_ROUTING_KEY {
                return Ok(None);
            }
            let event = serde_json::from_value(envelope.data)?;
            return Ok(Some(event));
        }
    }

    let event = serde_json::from_slice(payload)?;
    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::OrderId;

    #[test]
    fn test_parse_enveloped_cancellation() {
        let payload = br#"{"event_type":"order.cancelled","timestamp":"","data":{"order_id":42}}"#;
        let event = parse_cancellation(payload).unwrap().unwrap();
        assert_eq!(event.order_id, OrderId::new(42));
    }

    #[test]
    fn test_parse_skips_other_event_types() {
        let payload = br#"{"event_type":"order.created","data":{"order_id":42}}"#;
        assert!(parse_cancellation(payload).unwrap().is_none());
    }

    #[test]
    fn test_parse_bare_payload() {
        let payload = br#"{"order_id":7,"cancelled_by":"customer"}"#;
        let event = parse_cancellation(payload).unwrap().unwrap();
        assert_eq!(event.order_id, OrderId::new(7));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_cancellation(b"not json").is_err());
    }
}
