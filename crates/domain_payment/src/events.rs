//! Domain events and the publisher port
//!
//! Every settled charge and every refund is announced on the bus with
//! at-least-once semantics. Publication happens strictly after the unit
//! of work commits and is best-effort: a broker failure is logged by the
//! orchestrators and never undoes a committed transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::{OrderId, PaymentId};

use crate::payment::PaymentMethod;

/// An outcome event emitted by the orchestrators
///
/// The variant determines the routing key (`payment.succeeded`,
/// `payment.failed`, `payment.refunded`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaymentEvent {
    Succeeded {
        payment_id: PaymentId,
        order_id: OrderId,
        amount: Decimal,
        method: PaymentMethod,
        reference: String,
    },
    Failed {
        payment_id: PaymentId,
        order_id: OrderId,
        amount: Decimal,
        reason: String,
    },
    Refunded {
        payment_id: PaymentId,
        order_id: OrderId,
        refund_amount: Decimal,
        total_refunded: Decimal,
        reason: String,
    },
}

impl PaymentEvent {
    /// Routing key for topic-based delivery
    pub fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::Succeeded { .. } => "payment.succeeded",
            PaymentEvent::Failed { .. } => "payment.failed",
            PaymentEvent::Refunded { .. } => "payment.refunded",
        }
    }

    /// Payment this event concerns
    pub fn payment_id(&self) -> PaymentId {
        match self {
            PaymentEvent::Succeeded { payment_id, .. }
            | PaymentEvent::Failed { payment_id, .. }
            | PaymentEvent::Refunded { payment_id, .. } => *payment_id,
        }
    }

    /// Wraps the event in the wire envelope
    pub fn envelope(&self) -> EventEnvelope {
        EventEnvelope {
            event_type: self.event_type().to_string(),
            timestamp: Utc::now(),
            data: serde_json::json!(self),
        }
    }
}

/// Wire envelope: `{event_type, timestamp, data}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Order-cancellation event consumed by the cancellation reactor
///
/// Additional fields on the wire are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
}

/// Routing key the cancellation reactor subscribes to
pub const ORDER_CANCELLED_ROUTING_KEY: &str = "order.cancelled";

/// Broker failure during publication
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Broker connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Event payload could not be serialized: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}

/// Durable, at-least-once event publication
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event to its routing key
    async fn publish(&self, event: &PaymentEvent) -> Result<(), EventError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_routing_keys() {
        let succeeded = PaymentEvent::Succeeded {
            payment_id: PaymentId::new(),
            order_id: OrderId::new(1),
            amount: dec!(10.00),
            method: PaymentMethod::Card,
            reference: "PAY20240101-ABCDEF".to_string(),
        };
        assert_eq!(succeeded.event_type(), "payment.succeeded");
    }

    #[test]
    fn test_envelope_shape() {
        let event = PaymentEvent::Refunded {
            payment_id: PaymentId::new(),
            order_id: OrderId::new(9),
            refund_amount: dec!(50.00),
            total_refunded: dec!(50.00),
            reason: "Order cancellation".to_string(),
        };

        let envelope = event.envelope();
        assert_eq!(envelope.event_type, "payment.refunded");

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["event_type"], "payment.refunded");
        assert_eq!(json["data"]["order_id"], 9);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_order_cancelled_ignores_extra_fields() {
        let raw = serde_json::json!({"order_id": 77, "cancelled_by": "customer"});
        let event: OrderCancelled = serde_json::from_value(raw).unwrap();
        assert_eq!(event.order_id, OrderId::new(77));
    }
}
