//! Event bus error types

use thiserror::Error;

/// Errors raised by the NATS adapter
#[derive(Debug, Error)]
pub enum BusError {
    #[error("NATS connection failed: {0}")]
    Connection(String),

    #[error("Stream setup failed: {0}")]
    Stream(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Payload could not be (de)serialized: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Serialization(err.to_string())
    }
}
