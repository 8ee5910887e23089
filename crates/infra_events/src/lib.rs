//! Event Bus Infrastructure
//!
//! NATS adapter for the payment engine's messaging edges: a JetStream
//! publisher implementing the domain's `EventPublisher` port, and the
//! long-lived consumer loop that feeds `order.cancelled` deliveries to
//! the cancellation reactor.

pub mod consumer;
pub mod error;
pub mod publisher;

pub use consumer::{CancellationConsumer, ConsumerConfig};
pub use error::BusError;
pub use publisher::{NatsEventPublisher, PublisherConfig};
